//! Outbound application events.
//!
//! The [`EmulatorService`](super::service::EmulatorService) emits these
//! through the [`EventSink`](super::ports::EventSink) port. Adapters on the
//! other side decide what to do with them (log to serial, count in tests).

use crate::rpc::packet::Source;
use crate::signal::{ConfigTarget, DesiredState};
use crate::storage::StoreError;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The service started and prepared the signal region.
    Started(DesiredState),

    /// The screen requested of the legacy CPU changed.
    StateChanged { from: DesiredState, to: DesiredState },

    /// A boot was accepted; the CPU is being sent to the trampoline.
    BootAccepted { slot: u8 },

    BootRejected { slot: u8, reason: &'static str },

    /// The CPU reached the trampoline with nothing loadable; the menu is
    /// served again.
    BootAborted { slot: Option<u8> },

    /// The chosen image now backs the served memory.
    ImageLoaded { slot: u8, size: u32 },

    /// An upload finished and the catalog entry was committed.
    ImageCommitted { slot: u8, size: u32, source: Source },

    /// A store operation from `source` failed.
    WriteRejected { source: Source, error: StoreError },

    WirelessConfigured,

    /// A configuration block was written for the CPU.
    ConfigBlockServed(ConfigTarget),

    /// The legacy CPU asked for the signal region to be reinitialized.
    LegacyReset,

    /// A controller firmware update was committed.
    OtaCommitted { size: u32 },
}
