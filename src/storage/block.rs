//! Block-granular writes with erase elision.

use log::debug;

use crate::app::ports::{FlashPort, StorageError};

use super::BLOCK_SIZE;

/// What [`program_block_if_changed`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockWrite {
    /// Contents already matched; flash untouched.
    Unchanged,
    /// Only bits had to be cleared; programmed without erasing.
    Programmed,
    /// Some bit had to go from 0 to 1; erased then programmed.
    ErasedAndProgrammed,
}

/// Make the block at `offset` hold `data`, touching flash as little as possible.
///
/// An erase is issued only if some bit of `data` is set where the current
/// contents have it cleared.
pub fn program_block_if_changed<F: FlashPort>(
    flash: &mut F,
    offset: usize,
    data: &[u8; BLOCK_SIZE],
) -> Result<BlockWrite, StorageError> {
    let current = flash.read(offset, BLOCK_SIZE)?;
    if current == data.as_slice() {
        return Ok(BlockWrite::Unchanged);
    }

    let needs_erase = current.iter().zip(data).any(|(&old, &new)| new & !old != 0);
    if needs_erase {
        flash.erase(offset)?;
    }
    flash.program(offset, data)?;
    debug!(
        "flash: block 0x{:06x} {}",
        offset,
        if needs_erase { "erased+programmed" } else { "programmed" }
    );

    Ok(if needs_erase {
        BlockWrite::ErasedAndProgrammed
    } else {
        BlockWrite::Programmed
    })
}

/// Streams bytes into a contiguous flash region one block at a time.
///
/// A block is written once the first byte past it arrives, or on
/// [`finish`](Self::finish). Bytes beyond `capacity` are dropped.
pub struct BlockWriter {
    base: usize,
    capacity: usize,
    cursor: usize,
    buf: [u8; BLOCK_SIZE],
}

impl BlockWriter {
    pub fn new(base: usize, capacity: usize) -> Self {
        Self {
            base,
            capacity,
            cursor: 0,
            buf: [0xFF; BLOCK_SIZE],
        }
    }

    /// Bytes accepted so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The block currently being filled.
    pub fn staged(&self) -> &[u8; BLOCK_SIZE] {
        &self.buf
    }

    /// Append `bytes`, flushing completed blocks. Returns how many were kept.
    pub fn write<F: FlashPort>(&mut self, flash: &mut F, bytes: &[u8]) -> Result<usize, StorageError> {
        let mut accepted = 0;
        for &byte in bytes {
            if self.cursor >= self.capacity {
                break;
            }
            if self.cursor % BLOCK_SIZE == 0 && self.cursor != 0 {
                self.flush(flash, self.cursor - BLOCK_SIZE)?;
            }
            self.buf[self.cursor % BLOCK_SIZE] = byte;
            self.cursor += 1;
            accepted += 1;
        }
        Ok(accepted)
    }

    /// Flush the block in progress and return the final length.
    pub fn finish<F: FlashPort>(&mut self, flash: &mut F) -> Result<usize, StorageError> {
        let block_start = self.cursor.saturating_sub(1) / BLOCK_SIZE * BLOCK_SIZE;
        self.flush(flash, block_start)?;
        Ok(self.cursor)
    }

    fn flush<F: FlashPort>(&mut self, flash: &mut F, region_offset: usize) -> Result<(), StorageError> {
        program_block_if_changed(flash, self.base + region_offset, &self.buf)?;
        self.buf.fill(0xFF);
        Ok(())
    }
}
