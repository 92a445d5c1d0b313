//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC on the device, stderr on the host).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
pub struct LogEventSink;

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | desired_state={:?}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::BootAccepted { slot } => {
                info!("BOOT  | slot {} accepted, waiting for trampoline", slot);
            }
            AppEvent::BootRejected { slot, reason } => {
                warn!("BOOT  | slot {} rejected: {}", slot, reason);
            }
            AppEvent::BootAborted { slot } => {
                warn!("BOOT  | {:?} not loaded, menu restored", slot);
            }
            AppEvent::ImageLoaded { slot, size } => {
                info!("BOOT  | slot {} loaded ({} bytes)", slot, size);
            }
            AppEvent::ImageCommitted { slot, size, source } => {
                info!("STORE | slot {} committed by {} ({} bytes)", slot, source, size);
            }
            AppEvent::WriteRejected { source, error } => {
                warn!("STORE | {} rejected: {}", source, error);
            }
            AppEvent::WirelessConfigured => {
                info!("NET   | wireless configuration stored");
            }
            AppEvent::ConfigBlockServed(target) => {
                info!("MAGIC | config block {:?} served", target);
            }
            AppEvent::LegacyReset => {
                info!("MAGIC | reset requested by legacy CPU");
            }
            AppEvent::OtaCommitted { size } => {
                info!("OTA   | {} bytes committed, restart pending", size);
            }
        }
    }
}
