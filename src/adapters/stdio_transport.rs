//! Console transport (USB CDC on the device, stdin/stdout on the host).
//!
//! Standard input has no portable non-blocking read, so a small reader
//! thread forwards bytes over a channel and [`Transport::read`] drains it
//! without blocking the control loop.

use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use log::{info, warn};

use crate::rpc::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioError {
    /// The input stream closed.
    Closed,
    Io,
}

impl core::fmt::Display for StdioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Closed => write!(f, "console input closed"),
            Self::Io => write!(f, "console I/O error"),
        }
    }
}

/// Transport over any byte source and sink; [`StdioTransport::console`]
/// wires it to the process console.
pub struct StdioTransport<W: Write> {
    rx: Receiver<u8>,
    out: W,
    closed: bool,
}

impl StdioTransport<std::io::Stdout> {
    /// Read from stdin, write to stdout.
    pub fn console() -> std::io::Result<Self> {
        Self::spawn(std::io::stdin(), std::io::stdout())
    }
}

impl<W: Write> StdioTransport<W> {
    /// Pump `input` from a background thread and write replies to `out`.
    pub fn spawn<R: Read + Send + 'static>(mut input: R, out: W) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdio-rx".into())
            .spawn(move || {
                let mut buf = [0u8; 256];
                loop {
                    match input.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if buf[..n].iter().any(|&b| tx.send(b).is_err()) {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            warn!("STDIO: read error: {}", e);
                            break;
                        }
                    }
                }
                info!("STDIO: input closed");
            })?;
        Ok(Self {
            rx,
            out,
            closed: false,
        })
    }

    pub fn output(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Transport for StdioTransport<W> {
    type Error = StdioError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StdioError> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.try_recv() {
                Ok(b) => {
                    buf[n] = b;
                    n += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if n == 0 {
                        self.closed = true;
                        return Err(StdioError::Closed);
                    }
                    break;
                }
            }
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StdioError> {
        self.out.write_all(data).map_err(|_| StdioError::Io)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), StdioError> {
        self.out.flush().map_err(|_| StdioError::Io)
    }

    fn available(&self) -> bool {
        !self.closed
    }
}
