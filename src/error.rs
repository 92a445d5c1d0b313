//! Unified error type for the emulator.
//!
//! Every subsystem error converts into [`Error`], so the startup path in
//! `main` can use `?` uniformly. All variants are `Copy`.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};
use crate::storage::StoreError;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Flash backend failure.
    Storage(StorageError),
    /// Image or update store failure.
    Store(StoreError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A transport could not be set up.
    Transport(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
