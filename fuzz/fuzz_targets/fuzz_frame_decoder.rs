//! Fuzz target: `FrameDecoder::push`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics, never exposes a payload outside
//! `PacketAvailable`, and that every accepted frame re-encodes to the
//! bytes that produced it.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use romemu::rpc::codec::{DecodeStatus, FrameDecoder, MAX_ENCODED_LEN, MAX_PAYLOAD, encode_frame};

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();
    let mut frame_start = 0;

    for (i, &byte) in data.iter().enumerate() {
        match decoder.push(byte) {
            DecodeStatus::Idle => assert!(decoder.payload().is_none()),
            DecodeStatus::Error => {
                assert!(decoder.payload().is_none());
                decoder.reset();
                frame_start = i + 1;
            }
            DecodeStatus::PacketAvailable => {
                let payload = decoder.payload().expect("payload available");
                let packet_type = decoder.packet_type().expect("type available");
                assert!(payload.len() <= MAX_PAYLOAD);

                let mut out = [0u8; MAX_ENCODED_LEN];
                let n = encode_frame(packet_type, payload, &mut out).expect("fits");
                assert_eq!(&out[..n], &data[frame_start..=i]);
                frame_start = i + 1;
            }
        }
    }
});
