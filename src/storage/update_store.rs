//! A/B storage for the controller's own firmware.
//!
//! Flow: OtaBegin → N × OtaData → OtaEnd → restart
//!
//! Each region ends in an 8-byte validity marker inside a reserved last
//! block. `ota_end` marks the freshly written region valid and then clears
//! the running region's marker with a bit-clearing program (no erase), so
//! boot selection switches over on the next restart. There is no rollback.

use core::fmt;
use log::{info, warn};

use crate::app::ports::FlashPort;
use crate::rpc::packet::Source;

use super::block::{BlockWriter, program_block_if_changed};
use super::{BLOCK_SIZE, StoreError};

/// Marker stored in the last bytes of a bootable region.
pub const VALIDITY_MARKER: [u8; 8] = *b"ROMEMU\x5A\xA5";

/// Which of the two regions to boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootRegion {
    A,
    B,
}

impl fmt::Display for BootRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving { token: Source, bytes_written: u32 },
    /// The new image is committed; a restart activates it.
    ReadyToRestart,
}

fn marker_offset<F: FlashPort>(flash: &F) -> usize {
    flash.size() - VALIDITY_MARKER.len()
}

fn marker_block<F: FlashPort>(flash: &F) -> usize {
    flash.size() - BLOCK_SIZE
}

/// Whether `flash` holds an intact validity marker.
pub fn region_is_valid<F: FlashPort>(flash: &F) -> bool {
    if flash.size() < BLOCK_SIZE {
        return false;
    }
    flash
        .read(marker_offset(flash), VALIDITY_MARKER.len())
        .is_ok_and(|m| m == VALIDITY_MARKER)
}

/// Prefer `a` when valid, else `b` when valid, else fall back to `a`.
pub fn select_boot_region<F: FlashPort>(a: &F, b: &F) -> BootRegion {
    if region_is_valid(a) {
        BootRegion::A
    } else if region_is_valid(b) {
        BootRegion::B
    } else {
        BootRegion::A
    }
}

/// Streams a new firmware image into the inactive region.
pub struct UpdateStore<F: FlashPort> {
    current: F,
    next: F,
    state: OtaState,
    writer: BlockWriter,
}

impl<F: FlashPort> UpdateStore<F> {
    /// `current` is the running region, `next` the one to overwrite.
    pub fn open(current: F, next: F) -> Result<Self, StoreError> {
        if current.size() < 2 * BLOCK_SIZE || next.size() < 2 * BLOCK_SIZE {
            return Err(StoreError::PartitionTooSmall);
        }
        let capacity = marker_block(&next);
        Ok(Self {
            current,
            next,
            state: OtaState::Idle,
            writer: BlockWriter::new(0, capacity),
        })
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Largest image the inactive region accepts.
    pub fn capacity(&self) -> usize {
        marker_block(&self.next)
    }

    pub fn current(&self) -> &F {
        &self.current
    }

    pub fn next(&self) -> &F {
        &self.next
    }

    /// Start a new update, taking the token for `token`.
    ///
    /// The inactive region's marker is cleared first so a half-written
    /// image is never selected.
    pub fn ota_begin(&mut self, token: Source) -> Result<(), StoreError> {
        if let OtaState::Receiving { token: prev, .. } = self.state {
            info!("OTA: {} takes over update from {}", token, prev);
        }
        clear_marker(&mut self.next)?;
        self.writer = BlockWriter::new(0, self.capacity());
        self.state = OtaState::Receiving {
            token,
            bytes_written: 0,
        };
        info!("OTA: begin from {} (capacity {} bytes)", token, self.capacity());
        Ok(())
    }

    /// Append bytes to the inactive region. Overflow is dropped.
    pub fn ota_data(&mut self, token: Source, bytes: &[u8]) -> Result<(), StoreError> {
        let written = self.check_token(token)?;
        let accepted = self.writer.write(&mut self.next, bytes)?;
        self.state = OtaState::Receiving {
            token,
            bytes_written: written + accepted as u32,
        };
        Ok(())
    }

    /// Flush, mark the new region valid and invalidate the running one.
    pub fn ota_end(&mut self, token: Source) -> Result<u32, StoreError> {
        self.check_token(token)?;
        let size = self.writer.finish(&mut self.next)? as u32;

        let mut block = [0xFFu8; BLOCK_SIZE];
        block[BLOCK_SIZE - VALIDITY_MARKER.len()..].copy_from_slice(&VALIDITY_MARKER);
        let offset = marker_block(&self.next);
        program_block_if_changed(&mut self.next, offset, &block)?;

        clear_marker(&mut self.current)?;
        self.state = OtaState::ReadyToRestart;
        info!("OTA: committed {} bytes, restart to activate", size);
        Ok(size)
    }

    fn check_token(&self, token: Source) -> Result<u32, StoreError> {
        match self.state {
            OtaState::Receiving {
                token: holder,
                bytes_written,
            } if holder == token => Ok(bytes_written),
            OtaState::Receiving { token: holder, .. } => {
                warn!("OTA: {} rejected, update held by {}", token, holder);
                Err(StoreError::WrongToken)
            }
            _ => Err(StoreError::NoSession),
        }
    }
}

/// Zero the marker bytes in place without erasing.
fn clear_marker<F: FlashPort>(flash: &mut F) -> Result<(), StoreError> {
    let offset = marker_offset(flash);
    flash.program(offset, &[0u8; VALIDITY_MARKER.len()])?;
    Ok(())
}
