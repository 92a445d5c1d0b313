//! Packet engine: decodes requests per source and dispatches them to the
//! [`EmulatorService`].
//!
//! **Transport-decoupled**: the engine owns one [`FrameDecoder`] per
//! [`Source`] and a shared [`FrameEncoder`], but no transport. Callers feed
//! bytes as they arrive and write the returned reply frame wherever the
//! request came from. Tunnelled requests are answered through the signal
//! channel's receive queue.
//!
//! Every request gets exactly one reply frame (`type ^ 0x80`) except
//! unknown types, which are dropped silently.

use embedded_hal::delay::DelayNs;
use log::{debug, info};

use crate::app::ports::{BusPort, EventSink, FlashPort};
use crate::app::service::{BootOutcome, EmulatorService};
use crate::storage::StoreError;

use super::codec::{DecodeStatus, FrameDecoder, FrameEncoder};
use super::packet::{PacketType, Source, Status};

pub struct RpcEngine {
    decoders: [FrameDecoder; Source::ALL.len()],
    encoder: FrameEncoder,
}

impl Default for RpcEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcEngine {
    pub fn new() -> Self {
        Self {
            decoders: core::array::from_fn(|_| FrameDecoder::new()),
            encoder: FrameEncoder::new(),
        }
    }

    /// Drop any partial frame from `source` (e.g. on reconnect).
    pub fn reset_source(&mut self, source: Source) {
        self.decoders[source.index()].reset();
    }

    /// Feed one byte from `source`. Returns the encoded reply when it
    /// completes a request.
    pub fn feed<B: BusPort, D: DelayNs, F: FlashPort, U: FlashPort>(
        &mut self,
        source: Source,
        byte: u8,
        app: &mut EmulatorService<B, D, F, U>,
        sink: &mut impl EventSink,
    ) -> Option<&[u8]> {
        let decoder = &mut self.decoders[source.index()];
        match decoder.push(byte) {
            DecodeStatus::Idle => None,
            DecodeStatus::Error => {
                debug!("RPC[{}]: framing error, decoder reset", source);
                decoder.reset();
                None
            }
            DecodeStatus::PacketAvailable => {
                let packet_type = decoder.packet_type()?;
                let payload = decoder.payload()?;
                dispatch(&mut self.encoder, source, packet_type, payload, app, sink)
            }
        }
    }

    /// Feed a chunk of bytes, passing every reply to `on_reply`.
    pub fn feed_bytes<B: BusPort, D: DelayNs, F: FlashPort, U: FlashPort>(
        &mut self,
        source: Source,
        bytes: &[u8],
        app: &mut EmulatorService<B, D, F, U>,
        sink: &mut impl EventSink,
        mut on_reply: impl FnMut(&[u8]),
    ) {
        for &b in bytes {
            if let Some(reply) = self.feed(source, b, app, sink) {
                on_reply(reply);
            }
        }
    }

    /// Feed a byte the legacy CPU sent through the signal channel; the
    /// reply is queued for it to read back.
    pub fn on_tunnel_byte<B: BusPort, D: DelayNs, F: FlashPort, U: FlashPort>(
        &mut self,
        byte: u8,
        app: &mut EmulatorService<B, D, F, U>,
        sink: &mut impl EventSink,
    ) {
        if let Some(reply) = self.feed(Source::Tunnel, byte, app, sink) {
            let signal = app.signal_mut();
            for &b in reply {
                signal.enqueue(b);
            }
        }
    }
}

// ── Dispatch ──────────────────────────────────────────────────

fn dispatch<'e, B: BusPort, D: DelayNs, F: FlashPort, U: FlashPort>(
    encoder: &'e mut FrameEncoder,
    source: Source,
    raw_type: u8,
    payload: &[u8],
    app: &mut EmulatorService<B, D, F, U>,
    sink: &mut impl EventSink,
) -> Option<&'e [u8]> {
    let Some(packet) = PacketType::from_u8(raw_type) else {
        debug!("RPC[{}]: unknown packet type {:#04x}", source, raw_type);
        return None;
    };
    encoder.begin(packet.reply_type());

    let status = match packet {
        PacketType::Ping => {
            encoder.push_slice(payload);
            None
        }
        PacketType::Trace => {
            for address in app.collect_trace() {
                encoder.push_slice(&address.to_le_bytes());
            }
            None
        }
        PacketType::Boot => Some(match payload {
            &[slot] => {
                info!("RPC[{}]: Boot slot {}", source, slot);
                match app.request_boot(slot, sink) {
                    BootOutcome::Accepted => Status::Ok,
                    BootOutcome::Busy => Status::Busy,
                    BootOutcome::Empty => Status::Empty,
                    BootOutcome::Invalid => Status::Invalid,
                }
            }
            _ => Status::Invalid,
        }),
        PacketType::WriteBegin => Some(match payload.split_first() {
            Some((&slot, name)) => {
                info!("RPC[{}]: WriteBegin slot {}", source, slot);
                status_of(app.write_begin(source, slot, name, sink))
            }
            None => Status::Invalid,
        }),
        PacketType::WriteData => Some(status_of(app.write_data(source, payload, sink))),
        PacketType::WriteEnd => Some(status_of(app.write_end(source, sink).map(drop))),
        PacketType::SetWirelessConfig => Some(match split_wireless(payload) {
            Some((ssid, psk)) => {
                info!("RPC[{}]: SetWirelessConfig", source);
                status_of(app.set_wireless_config(source, ssid, psk, sink))
            }
            None => Status::Invalid,
        }),
        PacketType::OtaBegin => {
            info!("RPC[{}]: OtaBegin", source);
            Some(status_of(app.ota_begin(source, sink)))
        }
        PacketType::OtaData => Some(status_of(app.ota_data(source, payload, sink))),
        PacketType::OtaEnd => Some(status_of(app.ota_end(source, sink).map(drop))),
    };

    if let Some(status) = status {
        encoder.push_slice(status.as_bytes());
    }
    Some(encoder.finalize())
}

/// `[ssid_len][ssid][psk]`
fn split_wireless(payload: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&len, rest) = payload.split_first()?;
    let len = usize::from(len);
    (len <= rest.len()).then(|| rest.split_at(len))
}

fn status_of(result: Result<(), StoreError>) -> Status {
    match result {
        Ok(()) => Status::Ok,
        Err(e) => status_for(e),
    }
}

/// Reply token for a failed store operation.
pub fn status_for(error: StoreError) -> Status {
    match error {
        StoreError::NoSession | StoreError::WrongToken => Status::Token,
        StoreError::InvalidSlot | StoreError::InvalidWirelessConfig => Status::Invalid,
        StoreError::EmptySlot => Status::Empty,
        StoreError::PartitionTooSmall
        | StoreError::Encode
        | StoreError::Unavailable
        | StoreError::Storage(_) => Status::Error,
    }
}

// ── Tests ────────────────────────────────────────────────────
