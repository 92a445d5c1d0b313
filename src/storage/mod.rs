//! Crash-safe, wear-leveled persistence on bit-clearing flash.
//!
//! Data partition layout:
//! ```text
//! ┌──────────────────────────────┬─────────────────────────────────────┐
//! │ 16 × 4 KiB superblock copies │ 16 × 64 KiB image slots             │
//! │ (rotating, newest = lowest   │ (slot n at IMAGE_REGION + n × 64K)  │
//! │  generation)                 │                                     │
//! └──────────────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! [`ImageStore`] owns the catalog and the slots. [`UpdateStore`] owns the
//! pair of regions holding the controller's own firmware.

pub mod block;
pub mod image_store;
pub mod superblock;
pub mod update_store;

use core::fmt;

use crate::app::ports::StorageError;

pub use image_store::ImageStore;
pub use superblock::{ImageInfo, Superblock, WirelessConfig, WirelessKind};
pub use update_store::UpdateStore;

/// Erase granularity of the flash.
pub const BLOCK_SIZE: usize = 4096;

/// Number of rotating superblock copies.
pub const SUPERBLOCK_COUNT: usize = 16;

/// Number of image slots.
pub const SLOT_COUNT: usize = 16;

/// Capacity of one image slot.
pub const MAX_IMAGE_SIZE: usize = 0x10000;

/// Offset of slot 0.
pub const IMAGE_REGION_OFFSET: usize = SUPERBLOCK_COUNT * BLOCK_SIZE;

/// Smallest data partition that holds the full layout.
pub const DATA_PARTITION_SIZE: usize = IMAGE_REGION_OFFSET + SLOT_COUNT * MAX_IMAGE_SIZE;

/// Errors surfaced by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Slot index outside `0..SLOT_COUNT`.
    InvalidSlot,
    /// No write session is open.
    NoSession,
    /// The session belongs to another source.
    WrongToken,
    /// The slot holds no committed image.
    EmptySlot,
    /// The partition cannot hold the layout.
    PartitionTooSmall,
    /// SSID/passphrase lengths are out of range.
    InvalidWirelessConfig,
    /// The catalog did not fit in one block.
    Encode,
    /// The store could not be opened at startup.
    Unavailable,
    /// The flash backend failed.
    Storage(StorageError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSlot => write!(f, "slot out of range"),
            Self::NoSession => write!(f, "no write session open"),
            Self::WrongToken => write!(f, "write session owned by another source"),
            Self::EmptySlot => write!(f, "slot is empty"),
            Self::PartitionTooSmall => write!(f, "partition too small"),
            Self::InvalidWirelessConfig => write!(f, "invalid wireless configuration"),
            Self::Encode => write!(f, "superblock encoding failed"),
            Self::Unavailable => write!(f, "store unavailable"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
