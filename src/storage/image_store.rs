//! Catalog of named images with crash-safe commits.
//!
//! Every commit writes the whole catalog to the *next* rotating copy with a
//! decremented generation, so the most recent committed copy is never
//! overwritten and a power cut mid-commit leaves it discoverable.
//!
//! Write sessions are guarded by a token (the [`Source`] that opened them).
//! A new `write_begin` from any source takes the token over.

use log::{info, warn};

use crate::app::ports::FlashPort;
use crate::rpc::packet::Source;

use super::block::{BlockWriter, program_block_if_changed};
use super::superblock::{ImageInfo, Superblock, WirelessConfig};
use super::{
    BLOCK_SIZE, DATA_PARTITION_SIZE, IMAGE_REGION_OFFSET, MAX_IMAGE_SIZE, SLOT_COUNT,
    SUPERBLOCK_COUNT, StoreError,
};

/// An in-progress upload.
struct WriteSession {
    slot: u8,
    token: Source,
    writer: BlockWriter,
}

/// Catalog plus slot storage on one data partition.
pub struct ImageStore<F: FlashPort> {
    flash: F,
    superblock: Superblock,
    write_index: usize,
    session: Option<WriteSession>,
    scratch: [u8; BLOCK_SIZE],
}

/// Byte offset of slot `slot`.
pub const fn image_offset(slot: u8) -> usize {
    IMAGE_REGION_OFFSET + slot as usize * MAX_IMAGE_SIZE
}

impl<F: FlashPort> ImageStore<F> {
    /// Load the newest valid superblock, or start from an empty catalog.
    pub fn open(flash: F) -> Result<Self, StoreError> {
        if flash.size() < DATA_PARTITION_SIZE {
            warn!(
                "store: partition is {} bytes, need {}",
                flash.size(),
                DATA_PARTITION_SIZE
            );
            return Err(StoreError::PartitionTooSmall);
        }

        let mut newest: Option<(usize, Superblock)> = None;
        for i in 0..SUPERBLOCK_COUNT {
            let Some(sb) = Superblock::decode(flash.read(i * BLOCK_SIZE, BLOCK_SIZE)?) else {
                continue;
            };
            if newest.as_ref().is_none_or(|(_, best)| sb.generation < best.generation) {
                newest = Some((i, sb));
            }
        }

        let (superblock, write_index) = match newest {
            Some((i, sb)) => {
                info!("store: superblock {} generation {}", i, sb.generation);
                (sb, (i + 1) % SUPERBLOCK_COUNT)
            }
            None => {
                info!("store: no valid superblock, starting empty");
                (Superblock::empty(), 0)
            }
        };

        Ok(Self {
            flash,
            superblock,
            write_index,
            session: None,
            scratch: [0xFF; BLOCK_SIZE],
        })
    }

    // ── Reads ─────────────────────────────────────────────────

    /// Catalog entry for `slot`.
    pub fn get_info(&self, slot: u8) -> Option<&ImageInfo> {
        self.superblock.images.get(usize::from(slot))
    }

    /// Committed bytes of `slot`.
    pub fn get_contents(&self, slot: u8) -> Result<&[u8], StoreError> {
        let info = self.get_info(slot).ok_or(StoreError::InvalidSlot)?;
        if !info.is_present() {
            return Err(StoreError::EmptySlot);
        }
        Ok(self.flash.read(image_offset(slot), info.size as usize)?)
    }

    pub fn wireless_config(&self) -> &WirelessConfig {
        &self.superblock.wireless
    }

    pub fn generation(&self) -> u32 {
        self.superblock.generation
    }

    /// Physical copy the next commit goes to.
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Slot and holder of the open session, if any.
    pub fn session(&self) -> Option<(u8, Source)> {
        self.session.as_ref().map(|s| (s.slot, s.token))
    }

    /// Bytes accepted by the open session.
    pub fn session_cursor(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.writer.cursor())
    }

    /// Block being filled by the open session.
    pub fn staged_block(&self) -> Option<&[u8; BLOCK_SIZE]> {
        self.session.as_ref().map(|s| s.writer.staged())
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    // ── Upload session ────────────────────────────────────────

    /// Start uploading into `slot`, taking the write token for `token`.
    ///
    /// The slot is committed as absent before any data is accepted.
    pub fn write_begin(&mut self, token: Source, slot: u8, name: &[u8]) -> Result<(), StoreError> {
        if usize::from(slot) >= SLOT_COUNT {
            return Err(StoreError::InvalidSlot);
        }
        if let Some(prev) = self.session.take() {
            info!(
                "store: {} takes over session on slot {} from {}",
                token, prev.slot, prev.token
            );
        }

        self.superblock.images[usize::from(slot)] = ImageInfo::pending(name);
        self.commit()?;

        self.session = Some(WriteSession {
            slot,
            token,
            writer: BlockWriter::new(image_offset(slot), MAX_IMAGE_SIZE),
        });
        info!("store: {} writing slot {}", token, slot);
        Ok(())
    }

    /// Append bytes to the open session. Bytes past the slot capacity are dropped.
    pub fn write_data(&mut self, token: Source, bytes: &[u8]) -> Result<(), StoreError> {
        let session = owned_session(&mut self.session, token)?;
        session.writer.write(&mut self.flash, bytes)?;
        Ok(())
    }

    /// Finish the open session, marking the slot present. Returns its size.
    ///
    /// With no data written yet this is a no-op returning 0: the slot stays
    /// absent and the session stays open.
    pub fn write_end(&mut self, token: Source) -> Result<u32, StoreError> {
        let session = owned_session(&mut self.session, token)?;
        if session.writer.cursor() == 0 {
            info!("store: slot {} end with no data, still open", session.slot);
            return Ok(0);
        }
        let size = session.writer.finish(&mut self.flash)? as u32;
        let slot = usize::from(session.slot);
        self.session = None;

        self.superblock.images[slot].size = size;
        self.commit()?;
        info!("store: slot {} committed ({} bytes)", slot, size);
        Ok(size)
    }

    // ── Configuration ─────────────────────────────────────────

    pub fn set_wireless_config(&mut self, config: WirelessConfig) -> Result<(), StoreError> {
        self.superblock.wireless = config;
        self.commit()
    }

    // ── Commit ────────────────────────────────────────────────

    /// Persist the catalog to the next rotating copy.
    ///
    /// The generation saturates at zero; exhausting it is not handled.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        self.superblock.generation = self.superblock.generation.saturating_sub(1);
        self.superblock.encode(&mut self.scratch)?;
        program_block_if_changed(&mut self.flash, self.write_index * BLOCK_SIZE, &self.scratch)?;
        self.write_index = (self.write_index + 1) % SUPERBLOCK_COUNT;
        Ok(())
    }
}

fn owned_session(
    session: &mut Option<WriteSession>,
    token: Source,
) -> Result<&mut WriteSession, StoreError> {
    match session.as_mut() {
        None => Err(StoreError::NoSession),
        Some(s) if s.token != token => {
            warn!("store: {} rejected, session held by {}", token, s.token);
            Err(StoreError::WrongToken)
        }
        Some(s) => Ok(s),
    }
}
