//! Signaling over a read-only bus.
//!
//! The legacy CPU cannot write to the memory it is served, so it talks to
//! the controller by *reading* agreed addresses in a tight loop. The
//! controller samples the address trace, recognizes the loop, performs the
//! side effect bound to that address and answers by changing what the CPU
//! reads next.
//!
//! ```text
//!  bus trace ──▶ SignalChannel::analyze ──▶ Signal ──▶ EmulatorService
//!                      │                                    │
//!                      └──── set_cell(addr, value) ◀────────┘
//! ```

pub mod channel;
pub mod layout;

pub use channel::SignalChannel;

use layout::CONFIG_BLOCK_LEN;

/// Screen the legacy-side menu should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DesiredState {
    MainMenu = 0,
    BootTrampoline = 1,
    PartitionError = 2,
    EmptySlotError = 3,
    ClientMode = 4,
}

/// Wireless link status reported in the network configuration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetworkStatus {
    NotPresent = 0,
    NotConfigured = 1,
    NotConnected = 2,
    WaitingForIp = 3,
    Connected = 4,
}

/// Which configuration block the legacy CPU asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTarget {
    Slot(u8),
    Network,
}

/// A classified observation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing actionable (idle, ambiguous, debounced or handled internally).
    None,
    /// The CPU is parked in the trampoline, which has just been released.
    InTrampoline,
    UserRequestedBoot(u8),
    UserRequestedTunnel,
    SerialByteFromLegacy(u8),
    ConfigRequest(ConfigTarget),
    /// The region was reinitialized at the CPU's request.
    ResetRequested,
}

/// Contents for the passive configuration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigBlock<'a> {
    Slot { present: bool, name: &'a [u8] },
    Network { status: NetworkStatus, ip: [u8; 4] },
}

impl ConfigBlock<'_> {
    /// Raw union bytes as the legacy CPU reads them.
    pub fn encode(&self) -> [u8; CONFIG_BLOCK_LEN] {
        let mut raw = [0u8; CONFIG_BLOCK_LEN];
        match *self {
            Self::Slot { present, name } => {
                let len = name.len().min(CONFIG_BLOCK_LEN - 2);
                raw[0] = u8::from(present);
                raw[1] = len as u8;
                raw[2..2 + len].copy_from_slice(&name[..len]);
            }
            Self::Network { status, ip } => {
                raw[0] = status as u8;
                raw[1..5].copy_from_slice(&ip);
            }
        }
        raw
    }
}
