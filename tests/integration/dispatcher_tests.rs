//! Integration tests for the packet engine → service → store pipeline.
//!
//! Requests are encoded exactly as a host tool would send them and the
//! replies are decoded back, so framing, dispatch and status mapping are
//! exercised together.

use crate::mock_hw::{RecordingSink, TestService, cpu_reads, frame, make_service, request, start};

use embassy_sync::channel::Channel;
use romemu::app::events::AppEvent;
use romemu::rpc::channels::{Inbound, InboundChannel, InboundChunk, NetworkLink, ReplyChannel};
use romemu::rpc::engine::RpcEngine;
use romemu::rpc::packet::Source;
use romemu::signal::DesiredState;
use romemu::storage::{ImageStore, StoreError};

const PING: u8 = 0;
const TRACE: u8 = 1;
const BOOT: u8 = 2;
const WRITE_BEGIN: u8 = 3;
const WRITE_DATA: u8 = 4;
const WRITE_END: u8 = 5;
const SET_WIRELESS: u8 = 6;
const OTA_BEGIN: u8 = 7;
const OTA_DATA: u8 = 8;
const OTA_END: u8 = 9;

fn setup() -> (RpcEngine, TestService, RecordingSink) {
    let (app, sink) = make_service();
    (RpcEngine::new(), app, sink)
}

/// Send a request and return the single status reply as a string.
fn status(
    engine: &mut RpcEngine,
    app: &mut TestService,
    sink: &mut RecordingSink,
    source: Source,
    packet_type: u8,
    payload: &[u8],
) -> String {
    let replies = request(engine, app, sink, source, packet_type, payload);
    assert_eq!(replies.len(), 1, "exactly one reply expected");
    assert_eq!(replies[0].0, packet_type ^ 0x80);
    String::from_utf8(replies[0].1.clone()).unwrap()
}

fn upload(engine: &mut RpcEngine, app: &mut TestService, sink: &mut RecordingSink, slot: u8, data: &[u8]) {
    let mut begin = vec![slot];
    begin.extend_from_slice(b"GAME");
    assert_eq!(status(engine, app, sink, Source::Usb, WRITE_BEGIN, &begin), "OK");
    for chunk in data.chunks(1000) {
        assert_eq!(status(engine, app, sink, Source::Usb, WRITE_DATA, chunk), "OK");
    }
    assert_eq!(status(engine, app, sink, Source::Usb, WRITE_END, &[]), "OK");
}

// ── Ping / unknown ────────────────────────────────────────────

#[test]
fn ping_echoes_payload() {
    let (mut engine, mut app, mut sink) = setup();
    let replies = request(&mut engine, &mut app, &mut sink, Source::Usb, PING, b"hello");
    assert_eq!(replies, vec![(0x80, b"hello".to_vec())]);
}

#[test]
fn unknown_type_gets_no_reply() {
    let (mut engine, mut app, mut sink) = setup();
    assert!(request(&mut engine, &mut app, &mut sink, Source::Usb, 0x42, b"x").is_empty());

    // The decoder is ready for the next frame.
    let replies = request(&mut engine, &mut app, &mut sink, Source::Usb, PING, b"");
    assert_eq!(replies, vec![(0x80, vec![])]);
}

#[test]
fn garbage_before_frame_is_skipped() {
    let (mut engine, mut app, mut sink) = setup();
    let mut bytes = vec![0x00, 0x13, 0xE1, 0x6D];
    bytes.extend(frame(PING, b"ok"));

    let mut out = Vec::new();
    engine.feed_bytes(Source::Usb, &bytes, &mut app, &mut sink, |r| out.extend_from_slice(r));
    assert_eq!(crate::mock_hw::decode_all(&out), vec![(0x80, b"ok".to_vec())]);
}

#[test]
fn sources_decode_independently() {
    let (mut engine, mut app, mut sink) = setup();
    let usb = frame(PING, b"usb");
    let (head, tail) = usb.split_at(4);

    let mut out = Vec::new();
    engine.feed_bytes(Source::Usb, head, &mut app, &mut sink, |r| out.extend_from_slice(r));
    let net = request(&mut engine, &mut app, &mut sink, Source::Network, PING, b"net");
    assert_eq!(net, vec![(0x80, b"net".to_vec())]);
    engine.feed_bytes(Source::Usb, tail, &mut app, &mut sink, |r| out.extend_from_slice(r));
    assert_eq!(crate::mock_hw::decode_all(&out), vec![(0x80, b"usb".to_vec())]);
}

// ── Trace ─────────────────────────────────────────────────────

#[test]
fn trace_returns_sampled_addresses() {
    let (mut engine, mut app, mut sink) = setup();
    app.signal_mut()
        .bus_mut()
        .windows
        .push_back(vec![0x1234, 0xF001, 0xFFFF]);

    let replies = request(&mut engine, &mut app, &mut sink, Source::Usb, TRACE, &[]);
    assert_eq!(replies, vec![(0x81, vec![0x34, 0x12, 0x01, 0xF0, 0xFF, 0xFF])]);
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_statuses() {
    let (mut engine, mut app, mut sink) = setup();
    let (e, a, s) = (&mut engine, &mut app, &mut sink);

    assert_eq!(status(e, a, s, Source::Usb, BOOT, &[4]), "EMPTY");
    assert_eq!(status(e, a, s, Source::Usb, BOOT, &[16]), "INVALID");
    assert_eq!(status(e, a, s, Source::Usb, BOOT, &[]), "INVALID");
    assert_eq!(status(e, a, s, Source::Usb, BOOT, &[1, 2]), "INVALID");

    upload(e, a, s, 4, &[0xAA; 10]);
    assert_eq!(status(e, a, s, Source::Network, BOOT, &[4]), "OK");
    assert_eq!(a.desired_state(), DesiredState::BootTrampoline);
    assert_eq!(status(e, a, s, Source::Network, BOOT, &[4]), "BUSY");
}

#[test]
fn remote_boot_of_empty_slot_keeps_menu() {
    let (mut engine, mut app, mut sink) = setup();
    assert_eq!(status(&mut engine, &mut app, &mut sink, Source::Usb, BOOT, &[0]), "EMPTY");
    assert_eq!(app.desired_state(), DesiredState::MainMenu);
}

#[test]
fn boot_after_image_started_is_busy() {
    let (mut engine, mut app, mut sink) = setup();
    upload(&mut engine, &mut app, &mut sink, 0, b"\x01\x02");
    assert_eq!(status(&mut engine, &mut app, &mut sink, Source::Usb, BOOT, &[0]), "OK");
    cpu_reads(&mut app, romemu::signal::layout::TRAMPOLINE);
    app.poll_bus(0, &mut sink);
    assert!(!app.in_menu());

    assert_eq!(status(&mut engine, &mut app, &mut sink, Source::Usb, BOOT, &[0]), "BUSY");
}

// ── Uploads ───────────────────────────────────────────────────

#[test]
fn upload_commits_image() {
    let (mut engine, mut app, mut sink) = setup();
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    upload(&mut engine, &mut app, &mut sink, 3, &data);

    let store = app.images().unwrap();
    let info = store.get_info(3).unwrap();
    assert_eq!(info.size, 5000);
    assert_eq!(info.name.as_slice(), b"GAME");
    assert_eq!(store.get_contents(3).unwrap(), data.as_slice());
    assert!(sink.contains(&AppEvent::ImageCommitted {
        slot: 3,
        size: 5000,
        source: Source::Usb
    }));
}

#[test]
fn empty_upload_leaves_slot_absent() {
    let (mut engine, mut app, mut sink) = setup();
    upload(&mut engine, &mut app, &mut sink, 2, &[]);

    assert!(!app.images().unwrap().get_info(2).unwrap().is_present());
    assert!(!sink.events.iter().any(|e| matches!(e, AppEvent::ImageCommitted { .. })));
    // The session is still open for late data.
    assert_eq!(status(&mut engine, &mut app, &mut sink, Source::Usb, WRITE_DATA, b"abc"), "OK");
    assert_eq!(status(&mut engine, &mut app, &mut sink, Source::Usb, WRITE_END, &[]), "OK");
    assert_eq!(app.images().unwrap().get_contents(2).unwrap(), b"abc");
}

#[test]
fn write_without_session_is_token() {
    let (mut engine, mut app, mut sink) = setup();
    assert_eq!(status(&mut engine, &mut app, &mut sink, Source::Usb, WRITE_DATA, b"x"), "TOKEN");
    assert_eq!(status(&mut engine, &mut app, &mut sink, Source::Usb, WRITE_END, &[]), "TOKEN");
}

#[test]
fn other_source_cannot_write_into_session() {
    let (mut engine, mut app, mut sink) = setup();
    let (e, a, s) = (&mut engine, &mut app, &mut sink);
    assert_eq!(status(e, a, s, Source::Usb, WRITE_BEGIN, b"\x02name"), "OK");
    assert_eq!(status(e, a, s, Source::Network, WRITE_DATA, b"x"), "TOKEN");
    assert_eq!(status(e, a, s, Source::Tunnel, WRITE_END, &[]), "TOKEN");
    assert!(matches!(
        s.last(),
        Some(AppEvent::WriteRejected {
            source: Source::Tunnel,
            error: StoreError::WrongToken
        })
    ));
}

#[test]
fn write_begin_takes_over_session() {
    let (mut engine, mut app, mut sink) = setup();
    let (e, a, s) = (&mut engine, &mut app, &mut sink);
    assert_eq!(status(e, a, s, Source::Usb, WRITE_BEGIN, b"\x01first"), "OK");
    assert_eq!(status(e, a, s, Source::Usb, WRITE_DATA, b"abc"), "OK");

    assert_eq!(status(e, a, s, Source::Network, WRITE_BEGIN, b"\x02second"), "OK");
    assert_eq!(status(e, a, s, Source::Usb, WRITE_DATA, b"abc"), "TOKEN");
    assert_eq!(status(e, a, s, Source::Network, WRITE_DATA, b"xyz"), "OK");
    assert_eq!(status(e, a, s, Source::Network, WRITE_END, &[]), "OK");

    let store = a.images().unwrap();
    assert!(!store.get_info(1).unwrap().is_present());
    assert_eq!(store.get_contents(2).unwrap(), b"xyz");
}

#[test]
fn write_begin_validates_slot() {
    let (mut engine, mut app, mut sink) = setup();
    let (e, a, s) = (&mut engine, &mut app, &mut sink);
    assert_eq!(status(e, a, s, Source::Usb, WRITE_BEGIN, &[]), "INVALID");
    assert_eq!(status(e, a, s, Source::Usb, WRITE_BEGIN, b"\x10name"), "INVALID");
}

#[test]
fn store_requests_without_partition_report_error() {
    let (mut app, mut sink) = start(None, None);
    let mut engine = RpcEngine::new();
    let (e, a, s) = (&mut engine, &mut app, &mut sink);
    assert_eq!(status(e, a, s, Source::Usb, WRITE_BEGIN, b"\x00n"), "ERROR");
    assert_eq!(status(e, a, s, Source::Usb, BOOT, &[0]), "EMPTY");
    assert_eq!(status(e, a, s, Source::Usb, OTA_BEGIN, &[]), "ERROR");
}

// ── Wireless ──────────────────────────────────────────────────

#[test]
fn wireless_config_is_validated_and_persisted() {
    let (mut engine, mut app, mut sink) = setup();
    let (e, a, s) = (&mut engine, &mut app, &mut sink);

    assert_eq!(status(e, a, s, Source::Usb, SET_WIRELESS, &[]), "INVALID");
    assert_eq!(status(e, a, s, Source::Usb, SET_WIRELESS, b"\x09home"), "INVALID");
    assert_eq!(status(e, a, s, Source::Usb, SET_WIRELESS, b"\x04homeshort"), "INVALID");
    assert_eq!(status(e, a, s, Source::Usb, SET_WIRELESS, b"\x04homepassword1"), "OK");

    let flash = a.images().unwrap().flash().clone();
    let reopened = ImageStore::open(flash).unwrap();
    assert_eq!(reopened.wireless_config().ssid.as_slice(), b"home");
    assert_eq!(reopened.wireless_config().psk.as_slice(), b"password1");
}

#[test]
fn open_network_needs_no_passphrase() {
    let (mut engine, mut app, mut sink) = setup();
    assert_eq!(
        status(&mut engine, &mut app, &mut sink, Source::Usb, SET_WIRELESS, b"\x04cafe"),
        "OK"
    );
    assert!(sink.contains(&AppEvent::WirelessConfigured));
}

// ── Controller update ─────────────────────────────────────────

#[test]
fn ota_flow_requests_restart() {
    let (mut engine, mut app, mut sink) = setup();
    let (e, a, s) = (&mut engine, &mut app, &mut sink);
    let firmware = vec![0x5Au8; 9000];

    assert_eq!(status(e, a, s, Source::Network, OTA_DATA, b"x"), "TOKEN");
    assert_eq!(status(e, a, s, Source::Network, OTA_BEGIN, &[]), "OK");
    for chunk in firmware.chunks(1024) {
        assert_eq!(status(e, a, s, Source::Network, OTA_DATA, chunk), "OK");
    }
    assert_eq!(status(e, a, s, Source::Usb, OTA_END, &[]), "TOKEN");
    assert!(!a.restart_requested());
    assert_eq!(status(e, a, s, Source::Network, OTA_END, &[]), "OK");
    assert!(a.restart_requested());
    assert!(s.contains(&AppEvent::OtaCommitted { size: 9000 }));
}

// ── Tunnel ────────────────────────────────────────────────────

#[test]
fn tunnel_reply_is_queued_for_the_cpu() {
    let (mut engine, mut app, mut sink) = setup();
    for b in frame(PING, b"hi") {
        engine.on_tunnel_byte(b, &mut app, &mut sink);
    }
    let expected = frame(PING ^ 0x80, b"hi");
    assert_eq!(app.signal().pending_bytes(), expected.len());
    assert_eq!(app.signal().bus().signal_cell(romemu::signal::layout::RECV_NONEMPTY), 1);
}

// ── Network link ──────────────────────────────────────────────

fn chunk(bytes: &[u8]) -> Inbound {
    Inbound::Data(InboundChunk {
        data: heapless::Vec::from_slice(bytes).unwrap(),
    })
}

#[test]
fn new_client_bytes_follow_the_reset() {
    let (mut engine, mut app, mut sink) = setup();
    let inbound: InboundChannel = Channel::new();
    let replies: ReplyChannel = Channel::new();
    let mut link = NetworkLink::new(&inbound, &replies);

    // Old client leaves half a frame, then a new client connects and sends
    // a whole one before the control loop runs.
    let ping = frame(PING, b"new");
    for message in [
        Inbound::Connected(1),
        chunk(&ping[..4]),
        Inbound::Disconnected,
        Inbound::Connected(2),
        chunk(&ping),
    ] {
        inbound.try_send(message).ok().unwrap();
    }

    assert!(link.pump(&mut engine, &mut app, &mut sink));
    assert_eq!(link.epoch(), 2);
    let reply = replies.try_receive().ok().unwrap();
    assert_eq!(reply.epoch, 2);
    assert_eq!(crate::mock_hw::decode_all(&reply.data), vec![(0x80, b"new".to_vec())]);
    assert!(replies.try_receive().is_err());
}

#[test]
fn replies_carry_the_client_epoch() {
    let (mut engine, mut app, mut sink) = setup();
    let inbound: InboundChannel = Channel::new();
    let replies: ReplyChannel = Channel::new();
    let mut link = NetworkLink::new(&inbound, &replies);

    for message in [
        Inbound::Connected(7),
        chunk(&frame(PING, b"old")),
        Inbound::Connected(8),
        chunk(&frame(PING, b"new")),
    ] {
        inbound.try_send(message).ok().unwrap();
    }
    link.pump(&mut engine, &mut app, &mut sink);

    let first = replies.try_receive().ok().unwrap();
    let second = replies.try_receive().ok().unwrap();
    assert_eq!((first.epoch, second.epoch), (7, 8));
    assert_eq!(crate::mock_hw::decode_all(&first.data), vec![(0x80, b"old".to_vec())]);
}

#[test]
fn idle_link_reports_no_activity() {
    let (mut engine, mut app, mut sink) = setup();
    let inbound: InboundChannel = Channel::new();
    let replies: ReplyChannel = Channel::new();
    let mut link = NetworkLink::new(&inbound, &replies);

    inbound.try_send(Inbound::Connected(1)).ok().unwrap();
    assert!(!link.pump(&mut engine, &mut app, &mut sink));
    assert!(replies.try_receive().is_err());
}
