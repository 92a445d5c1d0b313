//! Emulator service: the hexagonal core.
//!
//! [`EmulatorService`] owns the signal channel and both stores. It turns
//! signals from the legacy CPU and store requests from the packet
//! protocol into state changes, and reports them through [`EventSink`].
//!
//! ```text
//!  BusPort ──▶ ┌─────────────────────────────┐ ──▶ EventSink
//!              │       EmulatorService       │
//! FlashPort ◀──│ SignalChannel · ImageStore  │
//!              │        · UpdateStore        │
//!              └─────────────────────────────┘
//! ```
//!
//! Menu lifecycle:
//! ```text
//! MainMenu ──boot(slot)──▶ BootTrampoline ──InTrampoline──▶ image runs
//!    │  ▲                        (slot empty)
//!    │  └──── timeout ──── EmptySlotError ◀──┘
//!    └──tunnel──▶ ClientMode
//! ```

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::config::EmulatorConfig;
use crate::rpc::packet::Source;
use crate::signal::{ConfigBlock, ConfigTarget, DesiredState, NetworkStatus, Signal, SignalChannel};
use crate::storage::{ImageStore, StoreError, UpdateStore, WirelessConfig, SLOT_COUNT};

use super::events::AppEvent;
use super::ports::{BusPort, EventSink, FlashPort};

/// Result of a boot request, from a menu signal or a Boot packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    Accepted,
    /// Not showing the menu, or a boot is already under way.
    Busy,
    /// The slot holds no image.
    Empty,
    /// Slot index out of range.
    Invalid,
}

// ───────────────────────────────────────────────────────────────
// EmulatorService
// ───────────────────────────────────────────────────────────────

pub struct EmulatorService<B: BusPort, D: DelayNs, F: FlashPort, U: FlashPort> {
    config: EmulatorConfig,
    signal: SignalChannel<B, D>,
    /// `None` when the data partition could not be opened.
    images: Option<ImageStore<F>>,
    update: Option<UpdateStore<U>>,
    /// The menu image is being served and the signal region is live.
    in_menu: bool,
    /// Slot accepted for boot, loaded once the CPU parks in the trampoline.
    boot_slot: Option<u8>,
    /// When the empty-slot screen was raised.
    error_since_ms: Option<u64>,
    network: NetworkStatus,
    ip: [u8; 4],
    restart_requested: bool,
    window: Vec<u16>,
}

impl<B: BusPort, D: DelayNs, F: FlashPort, U: FlashPort> EmulatorService<B, D, F, U> {
    /// Does **not** touch the bus. Call [`start`](Self::start) next.
    pub fn new(
        config: EmulatorConfig,
        signal: SignalChannel<B, D>,
        images: Option<ImageStore<F>>,
        update: Option<UpdateStore<U>>,
    ) -> Self {
        let network = match &images {
            None => NetworkStatus::NotPresent,
            Some(store) if store.wireless_config().is_configured() => NetworkStatus::NotConnected,
            Some(_) => NetworkStatus::NotConfigured,
        };
        let window = vec![0; usize::from(config.trace_window)];
        Self {
            config,
            signal,
            images,
            update,
            in_menu: false,
            boot_slot: None,
            error_since_ms: None,
            network,
            ip: [0; 4],
            restart_requested: false,
            window,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Prepare the signal region and enter the menu.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        let initial = self.enter_menu();
        sink.emit(&AppEvent::Started(initial));
        info!("EmulatorService started in {:?}", initial);
    }

    /// Rewrite the signal region and trampoline, and show the menu again.
    fn enter_menu(&mut self) -> DesiredState {
        let initial = if self.images.is_some() {
            DesiredState::MainMenu
        } else {
            DesiredState::PartitionError
        };
        self.signal.prepare(initial);
        self.in_menu = true;
        self.boot_slot = None;
        initial
    }

    /// Sample one window of bus reads and act on it.
    ///
    /// Only full windows are classified. The returned signal lets the
    /// caller feed tunnelled bytes to the packet engine.
    pub fn poll_bus(&mut self, now_ms: u64, sink: &mut impl EventSink) -> Signal {
        if !self.in_menu {
            return Signal::None;
        }
        let timeout = Duration::from_micros(u64::from(self.config.trace_timeout_us));
        let n = self
            .signal
            .bus_mut()
            .sample_recent_addresses(&mut self.window, timeout);
        if n < self.window.len() {
            return Signal::None;
        }
        let signal = self.signal.analyze(&self.window);
        self.handle_signal(signal, now_ms, sink);
        signal
    }

    /// Apply the controller-side effect of a classified signal.
    pub fn handle_signal(&mut self, signal: Signal, now_ms: u64, sink: &mut impl EventSink) {
        match signal {
            Signal::None | Signal::SerialByteFromLegacy(_) => {}
            Signal::UserRequestedBoot(slot) => {
                if self.request_boot(slot, sink) == BootOutcome::Empty {
                    self.change_state(DesiredState::EmptySlotError, sink);
                    self.error_since_ms = Some(now_ms);
                }
            }
            Signal::UserRequestedTunnel => self.change_state(DesiredState::ClientMode, sink),
            Signal::InTrampoline => self.load_boot_image(sink),
            Signal::ConfigRequest(target) => self.serve_config_block(target, sink),
            Signal::ResetRequested => sink.emit(&AppEvent::LegacyReset),
        }
    }

    /// Periodic housekeeping: retire the empty-slot screen.
    pub fn tick(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        if let Some(since) = self.error_since_ms {
            if now_ms.saturating_sub(since) >= u64::from(self.config.empty_slot_error_ms) {
                self.error_since_ms = None;
                if self.signal.desired_state() == DesiredState::EmptySlotError {
                    self.change_state(DesiredState::MainMenu, sink);
                }
            }
        }
    }

    // ── Boot ──────────────────────────────────────────────────

    /// Accept `slot` for boot if the menu is idle and the slot is present.
    pub fn request_boot(&mut self, slot: u8, sink: &mut impl EventSink) -> BootOutcome {
        let outcome = if usize::from(slot) >= SLOT_COUNT {
            BootOutcome::Invalid
        } else if !self.in_menu || self.boot_slot.is_some() {
            BootOutcome::Busy
        } else if !self.slot_present(slot) {
            BootOutcome::Empty
        } else {
            BootOutcome::Accepted
        };

        match outcome {
            BootOutcome::Accepted => {
                self.boot_slot = Some(slot);
                self.error_since_ms = None;
                self.change_state(DesiredState::BootTrampoline, sink);
                sink.emit(&AppEvent::BootAccepted { slot });
            }
            BootOutcome::Busy => sink.emit(&AppEvent::BootRejected {
                slot,
                reason: "busy",
            }),
            BootOutcome::Empty => sink.emit(&AppEvent::BootRejected {
                slot,
                reason: "slot empty",
            }),
            BootOutcome::Invalid => sink.emit(&AppEvent::BootRejected {
                slot,
                reason: "invalid slot",
            }),
        }
        outcome
    }

    fn slot_present(&self, slot: u8) -> bool {
        self.images
            .as_ref()
            .and_then(|s| s.get_info(slot))
            .is_some_and(|info| info.is_present())
    }

    /// Copy the accepted image into the served memory.
    ///
    /// The region was just filled with no-ops, so bytes past the image
    /// stay harmless. With nothing to load the menu is put back.
    fn load_boot_image(&mut self, sink: &mut impl EventSink) {
        let Some(slot) = self.boot_slot.take() else {
            warn!("EmulatorService: CPU in trampoline without an accepted boot");
            self.abort_boot(None, sink);
            return;
        };
        self.in_menu = false;

        let contents = match self.images.as_ref().map(|s| s.get_contents(slot)) {
            Some(Ok(contents)) => contents,
            Some(Err(e)) => {
                warn!("EmulatorService: slot {} unreadable: {}", slot, e);
                self.abort_boot(Some(slot), sink);
                return;
            }
            None => {
                self.abort_boot(Some(slot), sink);
                return;
            }
        };
        let bus = self.signal.bus_mut();
        for (address, &byte) in (0..=u16::MAX).zip(contents) {
            bus.set_cell(address, byte);
        }
        sink.emit(&AppEvent::ImageLoaded {
            slot,
            size: contents.len() as u32,
        });
    }

    fn abort_boot(&mut self, slot: Option<u8>, sink: &mut impl EventSink) {
        let state = self.enter_menu();
        sink.emit(&AppEvent::BootAborted { slot });
        info!("EmulatorService: boot aborted, back in {:?}", state);
    }

    // ── Configuration blocks ──────────────────────────────────

    fn serve_config_block(&mut self, target: ConfigTarget, sink: &mut impl EventSink) {
        let block = match target {
            ConfigTarget::Slot(slot) => match self.images.as_ref().and_then(|s| s.get_info(slot)) {
                Some(info) => ConfigBlock::Slot {
                    present: info.is_present(),
                    name: &info.name,
                },
                None => ConfigBlock::Slot {
                    present: false,
                    name: &[],
                },
            },
            ConfigTarget::Network => ConfigBlock::Network {
                status: self.network,
                ip: self.ip,
            },
        };
        self.signal.fill_configuration_block(&block);
        sink.emit(&AppEvent::ConfigBlockServed(target));
    }

    /// Report link state; the CPU is told to reload its network block.
    pub fn set_network_status(&mut self, status: NetworkStatus, ip: [u8; 4]) {
        if (status, ip) != (self.network, self.ip) {
            self.network = status;
            self.ip = ip;
            self.signal.signal_configuration_changed();
        }
    }

    // ── Image uploads ─────────────────────────────────────────

    pub fn write_begin(
        &mut self,
        source: Source,
        slot: u8,
        name: &[u8],
        sink: &mut impl EventSink,
    ) -> Result<(), StoreError> {
        let result = match self.images.as_mut() {
            Some(store) => store.write_begin(source, slot, name),
            None => Err(StoreError::Unavailable),
        };
        if result.is_ok() {
            // The slot is now absent.
            self.signal.signal_configuration_changed();
        }
        reject_on_error(result, source, sink)
    }

    pub fn write_data(
        &mut self,
        source: Source,
        bytes: &[u8],
        sink: &mut impl EventSink,
    ) -> Result<(), StoreError> {
        let result = match self.images.as_mut() {
            Some(store) => store.write_data(source, bytes),
            None => Err(StoreError::Unavailable),
        };
        reject_on_error(result, source, sink)
    }

    pub fn write_end(&mut self, source: Source, sink: &mut impl EventSink) -> Result<u32, StoreError> {
        let result = match self.images.as_mut() {
            Some(store) => match store.session() {
                Some((slot, _)) => store.write_end(source).map(|size| (slot, size)),
                None => Err(StoreError::NoSession),
            },
            None => Err(StoreError::Unavailable),
        };
        match result {
            // Nothing written yet: the session stays open.
            Ok((_, 0)) => Ok(0),
            Ok((slot, size)) => {
                self.signal.signal_configuration_changed();
                sink.emit(&AppEvent::ImageCommitted { slot, size, source });
                Ok(size)
            }
            Err(error) => reject(error, source, sink),
        }
    }

    pub fn set_wireless_config(
        &mut self,
        source: Source,
        ssid: &[u8],
        psk: &[u8],
        sink: &mut impl EventSink,
    ) -> Result<(), StoreError> {
        let result = WirelessConfig::new(ssid, psk).and_then(|config| match self.images.as_mut() {
            Some(store) => store.set_wireless_config(config),
            None => Err(StoreError::Unavailable),
        });
        match result {
            Ok(()) => {
                if self.network == NetworkStatus::NotConfigured {
                    self.network = NetworkStatus::NotConnected;
                }
                self.signal.signal_configuration_changed();
                sink.emit(&AppEvent::WirelessConfigured);
                Ok(())
            }
            Err(error) => reject(error, source, sink),
        }
    }

    // ── Controller firmware update ────────────────────────────

    pub fn ota_begin(&mut self, source: Source, sink: &mut impl EventSink) -> Result<(), StoreError> {
        let result = match self.update.as_mut() {
            Some(update) => update.ota_begin(source),
            None => Err(StoreError::Unavailable),
        };
        reject_on_error(result, source, sink)
    }

    pub fn ota_data(
        &mut self,
        source: Source,
        bytes: &[u8],
        sink: &mut impl EventSink,
    ) -> Result<(), StoreError> {
        let result = match self.update.as_mut() {
            Some(update) => update.ota_data(source, bytes),
            None => Err(StoreError::Unavailable),
        };
        reject_on_error(result, source, sink)
    }

    /// Commit the update. A restart is requested on success.
    pub fn ota_end(&mut self, source: Source, sink: &mut impl EventSink) -> Result<u32, StoreError> {
        let result = match self.update.as_mut() {
            Some(update) => update.ota_end(source),
            None => Err(StoreError::Unavailable),
        };
        match result {
            Ok(size) => {
                self.restart_requested = true;
                sink.emit(&AppEvent::OtaCommitted { size });
                Ok(size)
            }
            Err(error) => reject(error, source, sink),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Fresh bus-read samples for a Trace reply.
    pub fn collect_trace(&mut self) -> &[u16] {
        let timeout = Duration::from_micros(u64::from(self.config.trace_timeout_us));
        let n = self
            .signal
            .bus_mut()
            .sample_recent_addresses(&mut self.window, timeout);
        &self.window[..n]
    }

    pub fn desired_state(&self) -> DesiredState {
        self.signal.desired_state()
    }

    pub fn in_menu(&self) -> bool {
        self.in_menu
    }

    pub fn boot_slot(&self) -> Option<u8> {
        self.boot_slot
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.network
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn images(&self) -> Option<&ImageStore<F>> {
        self.images.as_ref()
    }

    pub fn update(&self) -> Option<&UpdateStore<U>> {
        self.update.as_ref()
    }

    pub fn signal(&self) -> &SignalChannel<B, D> {
        &self.signal
    }

    /// Tunnel replies are queued here for the CPU.
    pub fn signal_mut(&mut self) -> &mut SignalChannel<B, D> {
        &mut self.signal
    }

    // ── Internal ──────────────────────────────────────────────

    fn change_state(&mut self, to: DesiredState, sink: &mut impl EventSink) {
        let from = self.signal.desired_state();
        if from != to {
            self.signal.set_desired_state(to);
            sink.emit(&AppEvent::StateChanged { from, to });
        }
    }
}

fn reject<T>(error: StoreError, source: Source, sink: &mut impl EventSink) -> Result<T, StoreError> {
    sink.emit(&AppEvent::WriteRejected { source, error });
    Err(error)
}

fn reject_on_error<T>(
    result: Result<T, StoreError>,
    source: Source,
    sink: &mut impl EventSink,
) -> Result<T, StoreError> {
    result.or_else(|error| reject(error, source, sink))
}
