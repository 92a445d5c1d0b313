//! Inter-task channels between the network I/O thread and the control loop.
//!
//! Uses `embassy-sync` bounded channels so both sides share static queues
//! without heap allocation. Decoding stays on the control loop, which owns
//! the per-source decoders; the I/O thread only moves bytes.
//!
//! ```text
//! ┌──────────────┐    Inbound    ┌──────────────┐
//! │   I/O Task   │──────────────▶│ Control Loop │
//! │  (async)     │◀──────────────│   (sync)     │
//! └──────────────┘  ReplyFrame   └──────────────┘
//! ```
//!
//! Connection changes travel in the same queue as the data, so a reset is
//! always seen before the new client's first byte. Each accepted client gets
//! a new epoch; replies carry the epoch of the client they answer and the
//! I/O task drops any that belong to an earlier connection.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, warn};

use super::codec::MAX_ENCODED_LEN;
use super::engine::RpcEngine;
use super::packet::Source;
use crate::app::ports::{BusPort, EventSink, FlashPort};
use crate::app::service::EmulatorService;

/// Largest chunk the I/O task reads in one go.
pub const INBOUND_CHUNK: usize = 512;

/// Bytes received from the network client.
pub struct InboundChunk {
    pub data: Vec<u8, INBOUND_CHUNK>,
}

/// I/O task → control loop, in arrival order.
pub enum Inbound {
    /// A new client was accepted with this epoch.
    Connected(u32),
    Disconnected,
    Data(InboundChunk),
}

/// One encoded reply for the network client of `epoch`.
pub struct ReplyFrame {
    pub epoch: u32,
    pub data: Vec<u8, MAX_ENCODED_LEN>,
}

const INBOUND_DEPTH: usize = 16;
const REPLY_DEPTH: usize = 8;

pub type InboundChannel = Channel<CriticalSectionRawMutex, Inbound, INBOUND_DEPTH>;
pub type ReplyChannel = Channel<CriticalSectionRawMutex, ReplyFrame, REPLY_DEPTH>;

pub static INBOUND_CHANNEL: InboundChannel = Channel::new();

/// Control loop → I/O task.
pub static REPLY_CHANNEL: ReplyChannel = Channel::new();

// ── Control-loop side ────────────────────────────────────────

/// Control-loop end of the network link.
pub struct NetworkLink<'a> {
    inbound: &'a InboundChannel,
    replies: &'a ReplyChannel,
    epoch: u32,
}

impl NetworkLink<'static> {
    /// Link over the static channels served by the I/O thread.
    pub fn global() -> Self {
        Self::new(&INBOUND_CHANNEL, &REPLY_CHANNEL)
    }
}

impl<'a> NetworkLink<'a> {
    pub fn new(inbound: &'a InboundChannel, replies: &'a ReplyChannel) -> Self {
        Self {
            inbound,
            replies,
            epoch: 0,
        }
    }

    /// Epoch of the client replies are addressed to.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Drain everything the I/O task queued. Returns true if data arrived.
    pub fn pump<B: BusPort, D: DelayNs, F: FlashPort, U: FlashPort>(
        &mut self,
        engine: &mut RpcEngine,
        app: &mut EmulatorService<B, D, F, U>,
        sink: &mut impl EventSink,
    ) -> bool {
        let mut activity = false;
        while let Ok(message) = self.inbound.try_receive() {
            match message {
                Inbound::Connected(epoch) => {
                    debug!("net: client {} connected", epoch);
                    self.epoch = epoch;
                    engine.reset_source(Source::Network);
                }
                Inbound::Disconnected => {
                    debug!("net: client {} disconnected", self.epoch);
                    engine.reset_source(Source::Network);
                }
                Inbound::Data(chunk) => {
                    let (replies, epoch) = (self.replies, self.epoch);
                    engine.feed_bytes(Source::Network, &chunk.data, app, sink, |frame| {
                        send_reply(replies, epoch, frame)
                    });
                    activity = true;
                }
            }
        }
        activity
    }
}

/// Queue a reply frame for the network client of `epoch`.
fn send_reply(replies: &ReplyChannel, epoch: u32, frame: &[u8]) {
    let mut data = Vec::new();
    if data.extend_from_slice(frame).is_err() {
        warn!("RPC: reply larger than a frame, dropped");
        return;
    }
    if replies.try_send(ReplyFrame { epoch, data }).is_err() {
        warn!("RPC: reply channel full, dropping reply");
    }
}
