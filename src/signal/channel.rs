//! Signal region owner and trace classifier.

use embedded_hal::delay::DelayNs;
use heapless::Deque;
use log::{debug, info};

use crate::app::ports::BusPort;
use crate::rpc::codec::MAX_ENCODED_LEN;

use super::layout::{self as l, addr};
use super::{ConfigBlock, ConfigTarget, DesiredState, Signal};

/// Hits on one active address needed before acting on it.
pub const MIN_HITS: usize = 3;

/// The receive queue holds one maximal encoded reply.
pub const RECV_QUEUE_CAPACITY: usize = MAX_ENCODED_LEN;

/// Byte served when the CPU pops from an empty queue.
const EMPTY_QUEUE_PLACEHOLDER: u8 = b'?';

/// Delay around each trampoline rewrite.
const TRAMPOLINE_RELEASE_US: u32 = 200;

/// Owns the signal region's state and mirrors it onto the bus.
pub struct SignalChannel<B: BusPort, D: DelayNs> {
    bus: B,
    delay: D,
    reset_counter: u8,
    desired: DesiredState,
    /// Send-table entry cleared and waiting for the ack read.
    send_pending: Option<u8>,
    send_ack: bool,
    /// Configuration load cell cleared and waiting for the ack read.
    config_pending: Option<u16>,
    recv: Deque<u8, RECV_QUEUE_CAPACITY>,
}

impl<B: BusPort, D: DelayNs> SignalChannel<B, D> {
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            reset_counter: 0,
            desired: DesiredState::MainMenu,
            send_pending: None,
            send_ack: false,
            config_pending: None,
            recv: Deque::new(),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn desired_state(&self) -> DesiredState {
        self.desired
    }

    pub fn reset_counter(&self) -> u8 {
        self.reset_counter
    }

    /// Bytes waiting for the CPU.
    pub fn pending_bytes(&self) -> usize {
        self.recv.len()
    }

    fn set(&mut self, offset: u16, value: u8) {
        self.bus.set_cell(addr(offset), value);
    }

    // ── Initialization ────────────────────────────────────────

    /// Put every active cell at rest and install the trampoline.
    ///
    /// The reset counter is written last: the CPU polls it to learn
    /// that a reset it requested has completed.
    pub fn prepare(&mut self, initial: DesiredState) {
        for slot in 0..l::SLOTS {
            self.set(l::BOOT_REQUEST + slot, 1);
        }
        self.set_desired_state(initial);

        self.set(l::TUNNEL_SYNC1, 1);
        self.set(l::TUNNEL_SYNC2, 0);

        for value in 0..256u16 {
            self.set(l::SEND_TABLE + value, 1);
        }
        self.set(l::SEND_ACK, 0);
        self.send_pending = None;
        self.send_ack = false;

        self.recv.clear();
        self.set(l::RECV_NONEMPTY, 0);
        self.set(l::RECV_LOCK, 1);
        self.set(l::RECV_UNLOCK, 0);

        self.set(l::CONFIG_CHANGED, 0);
        for slot in 0..l::SLOTS {
            self.set(l::CONFIG_LOAD_SLOT + slot, 1);
        }
        self.set(l::CONFIG_LOAD_NETWORK, 1);
        self.set(l::CONFIG_LOAD_ACK, 0);
        self.config_pending = None;

        for (i, &b) in l::TRAMPOLINE_CODE.iter().enumerate() {
            self.bus.set_cell(l::TRAMPOLINE + i as u16, b);
        }

        self.reset_counter = self.reset_counter.wrapping_add(1);
        self.set(l::RESET_COUNTER, self.reset_counter);
        info!(
            "signal: prepared (state={:?}, reset={})",
            initial, self.reset_counter
        );
    }

    // ── Controller → CPU ──────────────────────────────────────

    pub fn set_desired_state(&mut self, state: DesiredState) {
        self.desired = state;
        self.set(l::DESIRED_STATE, state as u8);
    }

    /// Queue a byte for the CPU. Dropped when the queue is full.
    pub fn enqueue(&mut self, byte: u8) {
        if self.recv.push_back(byte).is_ok() {
            self.set(l::RECV_NONEMPTY, 1);
        }
    }

    pub fn fill_configuration_block(&mut self, block: &ConfigBlock<'_>) {
        for (i, &b) in block.encode().iter().enumerate() {
            self.set(l::CONFIG_BLOCK + i as u16, b);
        }
    }

    /// Tell the CPU that catalog or network data changed.
    pub fn signal_configuration_changed(&mut self) {
        self.set(l::CONFIG_CHANGED, 1);
    }

    // ── Classification ────────────────────────────────────────

    /// Classify one window of sampled addresses and apply its side effect.
    pub fn analyze(&mut self, samples: &[u16]) -> Signal {
        if samples.is_empty() {
            return Signal::None;
        }
        if samples.iter().all(|&a| a >= l::TRAMPOLINE) {
            self.release_trampoline();
            return Signal::InTrampoline;
        }

        let mut address = None;
        let mut hits = 0;
        for &a in samples.iter().filter(|&&a| l::is_active(a)) {
            match address {
                Some(seen) if seen != a => return Signal::None,
                _ => {
                    address = Some(a);
                    hits += 1;
                }
            }
        }
        match address {
            Some(a) if hits >= MIN_HITS => self.dispatch(a - l::BASE),
            _ => Signal::None,
        }
    }

    fn release_trampoline(&mut self) {
        for a in 0..l::TRAMPOLINE {
            self.bus.set_cell(a, l::NOP);
        }
        self.bus.set_cell(l::TRAMPOLINE + 1, l::NOP);
        self.delay.delay_us(TRAMPOLINE_RELEASE_US);
        self.bus.set_cell(l::TRAMPOLINE, l::NOP);
        self.delay.delay_us(TRAMPOLINE_RELEASE_US);
        info!("signal: trampoline released");
    }

    fn dispatch(&mut self, offset: u16) -> Signal {
        match offset {
            l::RESET_COUNTER => {
                self.prepare(self.desired);
                Signal::ResetRequested
            }
            o if (l::BOOT_REQUEST..l::BOOT_REQUEST + l::SLOTS).contains(&o) => {
                self.set(o, 0);
                Signal::UserRequestedBoot((o - l::BOOT_REQUEST) as u8)
            }
            l::TUNNEL_SYNC1 => {
                self.set(l::TUNNEL_SYNC2, 1);
                self.set(l::TUNNEL_SYNC1, 0);
                Signal::None
            }
            l::TUNNEL_SYNC2 => {
                self.set(l::TUNNEL_SYNC1, 1);
                self.set(l::TUNNEL_SYNC2, 0);
                Signal::UserRequestedTunnel
            }
            o if (l::SEND_TABLE..l::SEND_TABLE + 256).contains(&o) => {
                self.on_send((o - l::SEND_TABLE) as u8)
            }
            l::SEND_ACK => {
                if let Some(v) = self.send_pending.take() {
                    self.set(l::SEND_TABLE + u16::from(v), 1);
                }
                self.send_ack = false;
                self.set(l::SEND_ACK, 0);
                Signal::None
            }
            l::RECV_LOCK => {
                let byte = self.recv.pop_front().unwrap_or_else(|| {
                    debug!("signal: receive queue empty on lock");
                    EMPTY_QUEUE_PLACEHOLDER
                });
                self.set(l::RECV_DATA, byte);
                self.set(l::RECV_NONEMPTY, u8::from(!self.recv.is_empty()));
                self.set(l::RECV_UNLOCK, 1);
                self.set(l::RECV_LOCK, 0);
                Signal::None
            }
            l::RECV_UNLOCK => {
                self.set(l::RECV_LOCK, 1);
                self.set(l::RECV_UNLOCK, 0);
                Signal::None
            }
            l::CONFIG_CHANGED => {
                self.set(l::CONFIG_CHANGED, 0);
                Signal::None
            }
            o if (l::CONFIG_LOAD_SLOT..=l::CONFIG_LOAD_NETWORK).contains(&o) => {
                if let Some(prev) = self.config_pending.replace(o) {
                    self.set(prev, 1);
                }
                self.set(l::CONFIG_LOAD_ACK, 1);
                self.set(o, 0);
                Signal::ConfigRequest(if o == l::CONFIG_LOAD_NETWORK {
                    ConfigTarget::Network
                } else {
                    ConfigTarget::Slot((o - l::CONFIG_LOAD_SLOT) as u8)
                })
            }
            l::CONFIG_LOAD_ACK => {
                if let Some(prev) = self.config_pending.take() {
                    self.set(prev, 1);
                }
                self.set(l::CONFIG_LOAD_ACK, 0);
                Signal::None
            }
            _ => Signal::None,
        }
    }

    fn on_send(&mut self, value: u8) -> Signal {
        if self.send_ack && self.send_pending == Some(value) {
            // Still polling the entry we already took.
            return Signal::None;
        }
        if let Some(prev) = self.send_pending.replace(value) {
            if prev != value {
                self.set(l::SEND_TABLE + u16::from(prev), 1);
            }
        }
        self.send_ack = true;
        self.set(l::SEND_ACK, 1);
        self.set(l::SEND_TABLE + u16::from(value), 0);
        Signal::SerialByteFromLegacy(value)
    }
}
