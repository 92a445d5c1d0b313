//! Monotonic time and busy-wait delay adapters.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()` for uptime and
//!   the ROM `ets_delay_us` busy-wait (via `esp-idf-hal`) for delays.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and a spin
//!   wait, for the host simulator and tests.

use embedded_hal::delay::DelayNs;

/// Monotonic clock since construction (host) or boot (ESP-IDF).
pub struct UptimeClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for UptimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimeClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since construction (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn uptime_ms(&self) -> u64 {
        self.uptime_us() / 1000
    }
}

/// Busy-wait delay used around the trampoline rewrites.
#[cfg(target_os = "espidf")]
pub type BusDelay = esp_idf_hal::delay::Ets;

/// Busy-wait delay used around the trampoline rewrites.
#[cfg(not(target_os = "espidf"))]
pub type BusDelay = SpinDelay;

/// Delay implementation for the current target.
pub fn bus_delay() -> BusDelay {
    #[cfg(target_os = "espidf")]
    {
        esp_idf_hal::delay::Ets
    }
    #[cfg(not(target_os = "espidf"))]
    {
        SpinDelay
    }
}

/// Spins on `Instant` so short delays stay accurate on a desktop OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_nanos(u64::from(ns));
        while std::time::Instant::now() < deadline {
            core::hint::spin_loop();
        }
    }
}
