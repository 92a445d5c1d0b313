//! ROM emulator controller library.
//!
//! Serves the program memory of a legacy 8-bit terminal, talks to its CPU
//! through memory reads, and keeps a catalog of firmware images on flash.
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod rpc;
pub mod signal;
pub mod storage;

pub use error::{Error, Result};
