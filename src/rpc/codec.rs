//! Magic-delimited, CRC-checked frame codec.
//!
//! Wire format (all multi-byte fields little-endian):
//! ```text
//! ┌──────┬──────┬────────────┬──────┬──────────────┬────────────┬──────┬──────┐
//! │ 0xA7 │ 0x5C │ Length(2B) │ Type │ Payload (N B)│ CRC16 (2B) │ 0xE1 │ 0x6D │
//! └──────┴──────┴────────────┴──────┴──────────────┴────────────┴──────┴──────┘
//! ```
//!
//! The CRC is CRC16-CCITT (poly 0x1021, init 0, no reflection) computed
//! over the length, type and payload bytes.
//!
//! The decoder consumes one byte at a time so it can sit directly behind
//! a serial line, a TCP socket or the tunnel byte channel. A completed
//! frame stays readable until the next byte is pushed.

/// Maximum payload size in either direction.
pub const MAX_PAYLOAD: usize = 1024;

/// Bytes of framing around the payload.
pub const FRAME_OVERHEAD: usize = 9;

/// Largest possible encoded frame.
pub const MAX_ENCODED_LEN: usize = MAX_PAYLOAD + FRAME_OVERHEAD;

const MAGIC_BEGIN: [u8; 2] = [0xA7, 0x5C];
const MAGIC_END: [u8; 2] = [0xE1, 0x6D];

/// CRC16-CCITT step for one byte.
const fn crc16_step(mut crc: u16, byte: u8) -> u16 {
    crc ^= (byte as u16) << 8;
    let mut i = 0;
    while i < 8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ 0x1021
        } else {
            crc << 1
        };
        i += 1;
    }
    crc
}

/// CRC16-CCITT over `data`, continuing from `crc`.
pub fn crc16_update(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |c, &b| crc16_step(c, b))
}

/// CRC16-CCITT over `data` starting from zero.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0, data)
}

// ── Decoder ──────────────────────────────────────────────────

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    MagicBegin1,
    MagicBegin2,
    LengthLow,
    LengthHigh,
    Type,
    Payload,
    CrcLow,
    CrcHigh,
    MagicEnd1,
    MagicEnd2,
    Error,
    PacketAvailable,
}

/// Result of pushing one byte into the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// More bytes are needed.
    Idle,
    /// The stream is corrupt; the decoder stays here until [`FrameDecoder::reset`].
    Error,
    /// A complete, CRC-verified frame is available.
    PacketAvailable,
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    length: u16,
    packet_type: u8,
    cursor: usize,
    crc: u16,
    payload: [u8; MAX_PAYLOAD],
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::MagicBegin1,
            length: 0,
            packet_type: 0,
            cursor: 0,
            crc: 0,
            payload: [0; MAX_PAYLOAD],
        }
    }

    /// Return to the initial state, clearing a sticky error.
    pub fn reset(&mut self) {
        self.state = DecoderState::MagicBegin1;
        self.length = 0;
        self.cursor = 0;
    }

    /// Feed one byte.
    pub fn push(&mut self, byte: u8) -> DecodeStatus {
        use DecoderState as S;

        self.state = match self.state {
            S::Error => S::Error,
            S::MagicBegin1 | S::PacketAvailable => {
                if byte == MAGIC_BEGIN[0] {
                    S::MagicBegin2
                } else {
                    S::Error
                }
            }
            S::MagicBegin2 => {
                if byte == MAGIC_BEGIN[1] {
                    S::LengthLow
                } else {
                    S::Error
                }
            }
            S::LengthLow => {
                self.length = u16::from(byte);
                S::LengthHigh
            }
            S::LengthHigh => {
                self.length |= u16::from(byte) << 8;
                if usize::from(self.length) > MAX_PAYLOAD {
                    S::Error
                } else {
                    S::Type
                }
            }
            S::Type => {
                self.packet_type = byte;
                self.cursor = 0;
                if self.length == 0 {
                    S::CrcLow
                } else {
                    S::Payload
                }
            }
            S::Payload => {
                self.payload[self.cursor] = byte;
                self.cursor += 1;
                if self.cursor == usize::from(self.length) {
                    S::CrcLow
                } else {
                    S::Payload
                }
            }
            S::CrcLow => {
                self.crc = self.expected_crc();
                if byte == self.crc.to_le_bytes()[0] {
                    S::CrcHigh
                } else {
                    S::Error
                }
            }
            S::CrcHigh => {
                if byte == self.crc.to_le_bytes()[1] {
                    S::MagicEnd1
                } else {
                    S::Error
                }
            }
            S::MagicEnd1 => {
                if byte == MAGIC_END[0] {
                    S::MagicEnd2
                } else {
                    S::Error
                }
            }
            S::MagicEnd2 => {
                if byte == MAGIC_END[1] {
                    S::PacketAvailable
                } else {
                    S::Error
                }
            }
        };

        match self.state {
            S::Error => DecodeStatus::Error,
            S::PacketAvailable => DecodeStatus::PacketAvailable,
            _ => DecodeStatus::Idle,
        }
    }

    fn expected_crc(&self) -> u16 {
        let len = self.length.to_le_bytes();
        let crc = crc16_update(0, &len);
        let crc = crc16_update(crc, &[self.packet_type]);
        crc16_update(crc, &self.payload[..usize::from(self.length)])
    }

    /// Type byte of the available frame.
    pub fn packet_type(&self) -> Option<u8> {
        (self.state == DecoderState::PacketAvailable).then_some(self.packet_type)
    }

    /// Payload of the available frame.
    pub fn payload(&self) -> Option<&[u8]> {
        (self.state == DecoderState::PacketAvailable)
            .then(|| &self.payload[..usize::from(self.length)])
    }

    /// Payload length of the available frame.
    pub fn len(&self) -> Option<usize> {
        (self.state == DecoderState::PacketAvailable).then_some(usize::from(self.length))
    }

    /// Whether the decoder is in the sticky error state.
    pub fn is_error(&self) -> bool {
        self.state == DecoderState::Error
    }
}

// ── Encoder ──────────────────────────────────────────────────

/// Builds one outgoing frame at a time in a fixed buffer.
pub struct FrameEncoder {
    buf: [u8; MAX_ENCODED_LEN],
    len: usize,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    const PAYLOAD_START: usize = 5;

    pub fn new() -> Self {
        Self {
            buf: [0; MAX_ENCODED_LEN],
            len: 0,
        }
    }

    /// Start a new frame, discarding any previous one.
    pub fn begin(&mut self, packet_type: u8) {
        self.buf[..2].copy_from_slice(&MAGIC_BEGIN);
        self.buf[4] = packet_type;
        self.len = 0;
    }

    /// Append one payload byte. Returns `false` once the payload is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len == MAX_PAYLOAD {
            return false;
        }
        self.buf[Self::PAYLOAD_START + self.len] = byte;
        self.len += 1;
        true
    }

    /// Append as much of `bytes` as fits. Returns the number of bytes refused.
    pub fn push_slice(&mut self, bytes: &[u8]) -> usize {
        let take = bytes.len().min(MAX_PAYLOAD - self.len);
        let start = Self::PAYLOAD_START + self.len;
        self.buf[start..start + take].copy_from_slice(&bytes[..take]);
        self.len += take;
        bytes.len() - take
    }

    /// Payload bytes pushed so far.
    pub fn payload_len(&self) -> usize {
        self.len
    }

    /// Seal the frame and return the encoded bytes.
    ///
    /// The slice stays valid until the next [`begin`](Self::begin).
    pub fn finalize(&mut self) -> &[u8] {
        let len = (self.len as u16).to_le_bytes();
        self.buf[2..4].copy_from_slice(&len);
        let crc = crc16(&self.buf[2..Self::PAYLOAD_START + self.len]);
        let tail = Self::PAYLOAD_START + self.len;
        self.buf[tail..tail + 2].copy_from_slice(&crc.to_le_bytes());
        self.buf[tail + 2..tail + 4].copy_from_slice(&MAGIC_END);
        &self.buf[..tail + 4]
    }
}

/// Encode a complete frame into `out`. Returns the encoded length, or
/// `None` if the payload is too large or `out` too small.
pub fn encode_frame(packet_type: u8, payload: &[u8], out: &mut [u8]) -> Option<usize> {
    let total = payload.len() + FRAME_OVERHEAD;
    if payload.len() > MAX_PAYLOAD || total > out.len() {
        return None;
    }
    out[..2].copy_from_slice(&MAGIC_BEGIN);
    out[2..4].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    out[4] = packet_type;
    out[5..5 + payload.len()].copy_from_slice(payload);
    let crc = crc16(&out[2..5 + payload.len()]);
    out[5 + payload.len()..7 + payload.len()].copy_from_slice(&crc.to_le_bytes());
    out[7 + payload.len()..total].copy_from_slice(&MAGIC_END);
    Some(total)
}

// ── Tests ────────────────────────────────────────────────────
