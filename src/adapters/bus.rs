//! Shared emulated memory and bus-read trace.
//!
//! The 64 KiB image served to the legacy CPU and the trace of addresses it
//! read live in one [`SharedMemory`], split into two non-`Clone` halves:
//!
//! ```text
//!  control loop                          real-time bus server
//!  ┌───────────┐   cells (atomic u8)    ┌───────────┐
//!  │ BusWriter │ ─────── store ───────▶ │ BusReader │
//!  │           │ ◀────── trace ──────── │           │
//!  └───────────┘  SPSC ring of u16      └───────────┘
//! ```
//!
//! Only the writer stores cells and pops the trace; only the reader loads
//! cells and pushes the trace. Each field therefore has exactly one writer
//! and plain atomics suffice.

use core::sync::atomic::{AtomicU8, AtomicU16, AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use crate::app::ports::BusPort;

/// Size of the emulated address space.
pub const MEMORY_SIZE: usize = 0x10000;

/// Trace ring capacity (power of two).
pub const TRACE_CAPACITY: usize = 1024;

pub struct SharedMemory {
    cells: Box<[AtomicU8]>,
    trace: Box<[AtomicU16]>,
    trace_head: AtomicUsize,
    trace_tail: AtomicUsize,
}

impl SharedMemory {
    /// Allocate the memory (filled with `fill`) and split it.
    pub fn split(fill: u8) -> (BusWriter, BusReader) {
        let shared = Arc::new(Self {
            cells: (0..MEMORY_SIZE).map(|_| AtomicU8::new(fill)).collect(),
            trace: (0..TRACE_CAPACITY).map(|_| AtomicU16::new(0)).collect(),
            trace_head: AtomicUsize::new(0),
            trace_tail: AtomicUsize::new(0),
        });
        (
            BusWriter {
                shared: Arc::clone(&shared),
            },
            BusReader { shared },
        )
    }
}

// ── Control-loop half ─────────────────────────────────────────

/// Writes cells and consumes the trace.
pub struct BusWriter {
    shared: Arc<SharedMemory>,
}

impl BusWriter {
    /// Current value of a cell.
    pub fn cell(&self, address: u16) -> u8 {
        self.shared.cells[usize::from(address)].load(Ordering::Acquire)
    }

    /// Discard every sample recorded so far.
    pub fn discard_trace(&mut self) {
        let head = self.shared.trace_head.load(Ordering::Acquire);
        self.shared.trace_tail.store(head, Ordering::Release);
    }

    fn pop_sample(&mut self) -> Option<u16> {
        let tail = self.shared.trace_tail.load(Ordering::Relaxed);
        let head = self.shared.trace_head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let value = self.shared.trace[tail].load(Ordering::Relaxed);
        self.shared
            .trace_tail
            .store((tail + 1) % TRACE_CAPACITY, Ordering::Release);
        Some(value)
    }
}

impl BusPort for BusWriter {
    fn set_cell(&mut self, address: u16, value: u8) {
        self.shared.cells[usize::from(address)].store(value, Ordering::Release);
    }

    /// Drops stale samples, then waits for fresh ones until `buf` is full
    /// or `timeout` expires.
    fn sample_recent_addresses(&mut self, buf: &mut [u16], timeout: Duration) -> usize {
        self.discard_trace();
        let deadline = Instant::now() + timeout;
        let mut n = 0;
        while n < buf.len() {
            if let Some(a) = self.pop_sample() {
                buf[n] = a;
                n += 1;
            } else if Instant::now() >= deadline {
                break;
            } else {
                core::hint::spin_loop();
            }
        }
        n
    }
}

// ── Real-time half ────────────────────────────────────────────

/// Answers reads and records the addresses seen.
pub struct BusReader {
    shared: Arc<SharedMemory>,
}

impl BusReader {
    /// Serve one bus read: return the cell and trace the address.
    ///
    /// Never blocks. When the trace ring is full the sample is dropped.
    pub fn serve(&mut self, address: u16) -> u8 {
        let value = self.shared.cells[usize::from(address)].load(Ordering::Acquire);
        let head = self.shared.trace_head.load(Ordering::Relaxed);
        let next = (head + 1) % TRACE_CAPACITY;
        if next != self.shared.trace_tail.load(Ordering::Acquire) {
            self.shared.trace[head].store(address, Ordering::Relaxed);
            self.shared.trace_head.store(next, Ordering::Release);
        }
        value
    }

    /// Look at a cell without tracing the access.
    pub fn peek(&self, address: u16) -> u8 {
        self.shared.cells[usize::from(address)].load(Ordering::Acquire)
    }
}
