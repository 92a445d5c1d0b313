//! Flash adapters implementing [`FlashPort`].
//!
//! - **`target_os = "espidf"`**: [`PartitionFlash`] maps a partition with
//!   the ESP-IDF partition API.
//! - **all targets**: [`MemFlash`], an in-memory NOR simulation used by
//!   the host simulator and tests. It counts erases and programs and can
//!   simulate a power cut after a given number of operations.

use log::warn;

use crate::app::ports::{FlashPort, StorageError};
use crate::storage::BLOCK_SIZE;

// ───────────────────────────────────────────────────────────────
// In-memory NOR flash
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PowerCut {
    /// Mutating operations still allowed.
    remaining: usize,
    /// Apply the first half of the interrupted operation.
    torn: bool,
}

/// In-memory flash with erase-to-`0xFF` and AND-only programming.
#[derive(Debug, Clone)]
pub struct MemFlash {
    data: Vec<u8>,
    erases: usize,
    programs: usize,
    cut: Option<PowerCut>,
    powered: bool,
}

impl MemFlash {
    /// Fully erased flash of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            erases: 0,
            programs: 0,
            cut: None,
            powered: true,
        }
    }

    pub fn erase_count(&self) -> usize {
        self.erases
    }

    pub fn program_count(&self) -> usize {
        self.programs
    }

    pub fn reset_counters(&mut self) {
        self.erases = 0;
        self.programs = 0;
    }

    /// Lose power after `ops` more erase/program operations.
    ///
    /// With `torn`, the interrupted operation is half applied.
    pub fn cut_power_after(&mut self, ops: usize, torn: bool) {
        self.cut = Some(PowerCut {
            remaining: ops,
            torn,
        });
    }

    /// Whether a simulated power cut has happened.
    pub fn power_lost(&self) -> bool {
        !self.powered
    }

    /// Power back on with the contents as they were left.
    pub fn restore_power(&mut self) {
        self.cut = None;
        self.powered = true;
    }

    /// Returns `Some(torn)` when this operation is interrupted.
    fn consume_op(&mut self) -> Result<Option<bool>, StorageError> {
        if !self.powered {
            return Err(StorageError::Io);
        }
        match &mut self.cut {
            Some(cut) if cut.remaining == 0 => {
                self.powered = false;
                warn!("flash(sim): power cut");
                Ok(Some(cut.torn))
            }
            Some(cut) => {
                cut.remaining -= 1;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), StorageError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(StorageError::OutOfBounds),
        }
    }
}

impl FlashPort for MemFlash {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn read(&self, offset: usize, len: usize) -> Result<&[u8], StorageError> {
        self.check_range(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    fn erase(&mut self, offset: usize) -> Result<(), StorageError> {
        if offset % BLOCK_SIZE != 0 {
            return Err(StorageError::Misaligned);
        }
        self.check_range(offset, BLOCK_SIZE)?;
        let interrupted = self.consume_op()?;
        let len = match interrupted {
            None => BLOCK_SIZE,
            Some(true) => BLOCK_SIZE / 2,
            Some(false) => 0,
        };
        self.data[offset..offset + len].fill(0xFF);
        self.erases += 1;
        if interrupted.is_some() {
            return Err(StorageError::Io);
        }
        Ok(())
    }

    fn program(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        self.check_range(offset, data.len())?;
        let interrupted = self.consume_op()?;
        let len = match interrupted {
            None => data.len(),
            Some(true) => data.len() / 2,
            Some(false) => 0,
        };
        for (cell, &b) in self.data[offset..offset + len].iter_mut().zip(data) {
            *cell &= b;
        }
        self.programs += 1;
        if interrupted.is_some() {
            return Err(StorageError::Io);
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF data partition
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp_impl::PartitionFlash;

#[cfg(target_os = "espidf")]
mod esp_impl {
    use core::ffi::{CStr, c_void};

    use esp_idf_svc::sys;
    use log::{info, warn};

    use crate::app::ports::{FlashPort, StorageError};
    use crate::storage::BLOCK_SIZE;

    /// A memory-mapped flash partition (image data or a firmware region).
    pub struct PartitionFlash {
        partition: *const sys::esp_partition_t,
        mapped: *const u8,
        size: usize,
        handle: sys::esp_partition_mmap_handle_t,
    }

    // SAFETY: the partition descriptor is a static table entry and the
    // mapping is read-only; the struct is only ever used from one task.
    unsafe impl Send for PartitionFlash {}

    impl PartitionFlash {
        /// Find the partition labelled `label` and map it.
        pub fn open(label: &CStr) -> Result<Self, StorageError> {
            // SAFETY: `label` is NUL-terminated; a null result is checked.
            let partition = unsafe {
                sys::esp_partition_find_first(
                    sys::esp_partition_type_t_ESP_PARTITION_TYPE_ANY,
                    sys::esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_ANY,
                    label.as_ptr(),
                )
            };
            if partition.is_null() {
                warn!("flash: partition {:?} not found", label);
                return Err(StorageError::Io);
            }
            // SAFETY: non-null descriptor from the partition table.
            let size = unsafe { (*partition).size } as usize;

            let mut ptr: *const c_void = core::ptr::null();
            let mut handle: sys::esp_partition_mmap_handle_t = 0;
            // SAFETY: out-pointers are valid for the duration of the call.
            let err = unsafe {
                sys::esp_partition_mmap(
                    partition,
                    0,
                    size,
                    sys::esp_partition_mmap_memory_t_ESP_PARTITION_MMAP_DATA,
                    &mut ptr,
                    &mut handle,
                )
            };
            if err != sys::ESP_OK {
                warn!("flash: mmap failed ({})", err);
                return Err(StorageError::Io);
            }
            info!("flash: partition {:?} mapped ({} bytes)", label, size);
            Ok(Self {
                partition,
                mapped: ptr.cast(),
                size,
                handle,
            })
        }
    }

    impl Drop for PartitionFlash {
        fn drop(&mut self) {
            // SAFETY: `handle` came from a successful mmap.
            unsafe { sys::esp_partition_munmap(self.handle) };
        }
    }

    impl FlashPort for PartitionFlash {
        fn size(&self) -> usize {
            self.size
        }

        fn read(&self, offset: usize, len: usize) -> Result<&[u8], StorageError> {
            if offset.checked_add(len).is_none_or(|end| end > self.size) {
                return Err(StorageError::OutOfBounds);
            }
            // SAFETY: range checked against the mapping size; the mapping
            // lives as long as `self`.
            Ok(unsafe { core::slice::from_raw_parts(self.mapped.add(offset), len) })
        }

        fn erase(&mut self, offset: usize) -> Result<(), StorageError> {
            if offset % BLOCK_SIZE != 0 {
                return Err(StorageError::Misaligned);
            }
            // SAFETY: valid partition descriptor; range checked by IDF.
            let err = unsafe { sys::esp_partition_erase_range(self.partition, offset, BLOCK_SIZE) };
            if err == sys::ESP_OK { Ok(()) } else { Err(StorageError::Io) }
        }

        fn program(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
            // SAFETY: `data` is valid for `data.len()` bytes.
            let err = unsafe {
                sys::esp_partition_write(self.partition, offset, data.as_ptr().cast(), data.len())
            };
            if err == sys::ESP_OK { Ok(()) } else { Err(StorageError::Io) }
        }
    }
}
