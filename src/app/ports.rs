//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ EmulatorService (domain)
//! ```
//!
//! Driven adapters (bus driver, flash, event sinks) implement these
//! traits.  The domain core is generic over them, so the signal channel
//! and both stores run against in-memory fakes in tests.

use core::fmt;
use core::time::Duration;

// ───────────────────────────────────────────────────────────────
// Bus port (driven adapter: domain ↔ emulated memory)
// ───────────────────────────────────────────────────────────────

/// The memory the legacy CPU reads, as seen from the control loop.
///
/// Implementations must never block the real-time side: `set_cell` is a
/// single atomic store, and sampling waits at most `timeout`.
pub trait BusPort {
    /// Set the byte returned for reads of `address`.
    fn set_cell(&mut self, address: u16, value: u8);

    /// Collect up to `buf.len()` of the most recently read addresses,
    /// oldest first, stopping early once `timeout` elapses.
    ///
    /// Returns the number of samples written to `buf`.
    fn sample_recent_addresses(&mut self, buf: &mut [u16], timeout: Duration) -> usize;
}

// ───────────────────────────────────────────────────────────────
// Flash port (driven adapter: domain ↔ block storage)
// ───────────────────────────────────────────────────────────────

/// Block-erasable, bit-clearing storage (NOR flash semantics).
///
/// - `erase` sets every byte of one block to `0xFF`.
/// - `program` can only clear bits: the stored result is `old & new`.
/// - `read` is memory-mapped and always reflects completed programs.
pub trait FlashPort {
    /// Total size in bytes.
    fn size(&self) -> usize;

    /// Borrow `len` bytes starting at `offset`.
    fn read(&self, offset: usize, len: usize) -> Result<&[u8], StorageError>;

    /// Erase the block starting at `offset` (must be block-aligned).
    fn erase(&mut self, offset: usize) -> Result<(), StorageError>;

    /// Program `data` at `offset`.
    fn program(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;
}

impl<F: FlashPort + ?Sized> FlashPort for &mut F {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn read(&self, offset: usize, len: usize) -> Result<&[u8], StorageError> {
        (**self).read(offset, len)
    }

    fn erase(&mut self, offset: usize) -> Result<(), StorageError> {
        (**self).erase(offset)
    }

    fn program(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        (**self).program(offset, data)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`FlashPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The access extends past the end of the device.
    OutOfBounds,
    /// An erase was requested at an offset that is not block-aligned.
    Misaligned,
    /// The backend reported a failure.
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "access out of bounds"),
            Self::Misaligned => write!(f, "erase offset not block-aligned"),
            Self::Io => write!(f, "flash I/O error"),
        }
    }
}

/// Errors from configuration loading and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// The config document could not be parsed.
    Parse,
    /// The config file could not be read.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Parse => write!(f, "config parse error"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
