//! Transport abstraction: any byte-oriented channel carrying frames.
//!
//! Implementations:
//! - [`StdioTransport`](crate::adapters::stdio_transport::StdioTransport):
//!   USB console on the device, stdin/stdout on the host
//! - [`TcpTransport`](crate::adapters::tcp_transport::TcpTransport):
//!   one network client at a time
//!
//! The engine never touches a transport directly; the control loop and
//! the I/O task move bytes between the two.

/// Byte-oriented, non-blocking transport channel.
pub trait Transport {
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes. Returns 0 if nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data`. Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Whether the peer can still deliver data.
    fn available(&self) -> bool;
}
