//! Mock hardware adapters for integration tests.
//!
//! [`MockBus`] plays back scripted observation windows and records every
//! cell write, so tests can act as the legacy CPU (by choosing which
//! addresses it "reads") and then inspect what it would see.

use std::collections::VecDeque;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use romemu::adapters::flash::MemFlash;
use romemu::app::events::AppEvent;
use romemu::app::ports::{BusPort, EventSink};
use romemu::app::service::EmulatorService;
use romemu::config::EmulatorConfig;
use romemu::rpc::codec::{DecodeStatus, FrameDecoder, MAX_ENCODED_LEN, encode_frame};
use romemu::rpc::engine::RpcEngine;
use romemu::rpc::packet::Source;
use romemu::signal::SignalChannel;
use romemu::signal::layout::addr;
use romemu::storage::{DATA_PARTITION_SIZE, ImageStore, UpdateStore, update_store::VALIDITY_MARKER};

/// Size of each firmware region in tests.
pub const REGION_SIZE: usize = 16 * romemu::storage::BLOCK_SIZE;

// ── MockBus ───────────────────────────────────────────────────

pub struct MockBus {
    pub mem: Vec<u8>,
    pub windows: VecDeque<Vec<u16>>,
    pub writes: usize,
}

#[allow(dead_code)]
impl MockBus {
    pub fn new() -> Self {
        Self {
            mem: vec![0xFF; 0x10000],
            windows: VecDeque::new(),
            writes: 0,
        }
    }

    /// Value the CPU reads at signal-region `offset`.
    pub fn signal_cell(&self, offset: u16) -> u8 {
        self.mem[usize::from(addr(offset))]
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusPort for MockBus {
    fn set_cell(&mut self, address: u16, value: u8) {
        self.mem[usize::from(address)] = value;
        self.writes += 1;
    }

    fn sample_recent_addresses(&mut self, buf: &mut [u16], _timeout: Duration) -> usize {
        let window = self.windows.pop_front().unwrap_or_default();
        let n = window.len().min(buf.len());
        buf[..n].copy_from_slice(&window[..n]);
        n
    }
}

// ── NoDelay ───────────────────────────────────────────────────

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }

    pub fn last(&self) -> Option<&AppEvent> {
        self.events.last()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Fixtures ──────────────────────────────────────────────────

pub type TestService = EmulatorService<MockBus, NoDelay, MemFlash, MemFlash>;

#[allow(dead_code)]
pub fn data_flash() -> MemFlash {
    MemFlash::new(DATA_PARTITION_SIZE)
}

/// A firmware region carrying the validity marker.
#[allow(dead_code)]
pub fn valid_region() -> MemFlash {
    use romemu::app::ports::FlashPort;
    let mut flash = MemFlash::new(REGION_SIZE);
    flash
        .program(REGION_SIZE - VALIDITY_MARKER.len(), &VALIDITY_MARKER)
        .unwrap();
    flash
}

/// Started service with an empty image store and an update store.
#[allow(dead_code)]
pub fn make_service() -> (TestService, RecordingSink) {
    let images = ImageStore::open(data_flash()).unwrap();
    let update = UpdateStore::open(valid_region(), MemFlash::new(REGION_SIZE)).unwrap();
    start(Some(images), Some(update))
}

#[allow(dead_code)]
pub fn start(
    images: Option<ImageStore<MemFlash>>,
    update: Option<UpdateStore<MemFlash>>,
) -> (TestService, RecordingSink) {
    let mut app = EmulatorService::new(
        EmulatorConfig::default(),
        SignalChannel::new(MockBus::new(), NoDelay),
        images,
        update,
    );
    let mut sink = RecordingSink::new();
    app.start(&mut sink);
    (app, sink)
}

/// Queue a full observation window of reads at one address.
#[allow(dead_code)]
pub fn cpu_reads(app: &mut TestService, address: u16) {
    let window = vec![address; usize::from(app.config().trace_window)];
    app.signal_mut().bus_mut().windows.push_back(window);
}

// ── Frames ────────────────────────────────────────────────────

#[allow(dead_code)]
pub fn frame(packet_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = [0u8; MAX_ENCODED_LEN];
    let n = encode_frame(packet_type, payload, &mut out).unwrap();
    out[..n].to_vec()
}

/// Decode every complete frame in `bytes` as `(type, payload)`.
#[allow(dead_code)]
pub fn decode_all(bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for &b in bytes {
        match decoder.push(b) {
            DecodeStatus::PacketAvailable => frames.push((
                decoder.packet_type().unwrap(),
                decoder.payload().unwrap().to_vec(),
            )),
            DecodeStatus::Error => decoder.reset(),
            DecodeStatus::Idle => {}
        }
    }
    frames
}

/// Send one request and collect the reply frames it produced.
#[allow(dead_code)]
pub fn request(
    engine: &mut RpcEngine,
    app: &mut TestService,
    sink: &mut RecordingSink,
    source: Source,
    packet_type: u8,
    payload: &[u8],
) -> Vec<(u8, Vec<u8>)> {
    let mut replies = Vec::new();
    engine.feed_bytes(source, &frame(packet_type, payload), app, sink, |r| {
        replies.extend_from_slice(r)
    });
    decode_all(&replies)
}
