//! Catalog record persisted in each rotating superblock copy.
//!
//! On-flash encoding of one copy (one block):
//! ```text
//! ┌────────────────┬───────────────┬─────────────┬───────────────────┬──────┐
//! │ generation u32 │ body_len u16  │ body crc16  │ postcard(body)    │ 0xFF │
//! └────────────────┴───────────────┴─────────────┴───────────────────┴──────┘
//! ```
//!
//! A copy with the sentinel generation, a bad length, a CRC mismatch or an
//! undecodable body is treated as absent.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::rpc::codec::crc16;

use super::{BLOCK_SIZE, SLOT_COUNT, StoreError};

/// Generation value marking an unused copy.
pub const INVALID_GENERATION: u32 = u32::MAX;

/// `size` value marking an absent image.
pub const ABSENT_SIZE: u32 = u32::MAX;

pub const MAX_NAME_LEN: usize = 126;
pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PSK_LEN: usize = 63;
const MIN_PSK_LEN: usize = 8;

const HEADER_LEN: usize = 8;

/// Catalog entry for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub size: u32,
    pub name: Vec<u8, MAX_NAME_LEN>,
}

impl ImageInfo {
    pub fn absent() -> Self {
        Self {
            size: ABSENT_SIZE,
            name: Vec::new(),
        }
    }

    /// An absent entry carrying `name` (truncated to fit).
    pub fn pending(name: &[u8]) -> Self {
        let take = name.len().min(MAX_NAME_LEN);
        let mut n = Vec::new();
        // Cannot fail: `take` is bounded by the capacity.
        let _ = n.extend_from_slice(&name[..take]);
        Self {
            size: ABSENT_SIZE,
            name: n,
        }
    }

    pub fn is_present(&self) -> bool {
        self.size != ABSENT_SIZE
    }
}

/// Security mode of the stored wireless network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WirelessKind {
    Open,
    Wpa,
    NotConfigured,
}

/// Stored wireless network credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirelessConfig {
    pub kind: WirelessKind,
    pub ssid: Vec<u8, MAX_SSID_LEN>,
    pub psk: Vec<u8, MAX_PSK_LEN>,
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self::not_configured()
    }
}

impl WirelessConfig {
    pub fn not_configured() -> Self {
        Self {
            kind: WirelessKind::NotConfigured,
            ssid: Vec::new(),
            psk: Vec::new(),
        }
    }

    /// Build from raw credentials. An empty `psk` selects an open network.
    ///
    /// The SSID must be 1–32 bytes; a WPA passphrase 8–63 bytes.
    pub fn new(ssid: &[u8], psk: &[u8]) -> Result<Self, StoreError> {
        if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
            return Err(StoreError::InvalidWirelessConfig);
        }
        if !psk.is_empty() && !(MIN_PSK_LEN..=MAX_PSK_LEN).contains(&psk.len()) {
            return Err(StoreError::InvalidWirelessConfig);
        }
        let ssid = Vec::from_slice(ssid).map_err(|()| StoreError::InvalidWirelessConfig)?;
        let psk_buf = Vec::from_slice(psk).map_err(|()| StoreError::InvalidWirelessConfig)?;
        Ok(Self {
            kind: if psk.is_empty() {
                WirelessKind::Open
            } else {
                WirelessKind::Wpa
            },
            ssid,
            psk: psk_buf,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.kind != WirelessKind::NotConfigured
    }
}

#[derive(Serialize, Deserialize)]
struct Body {
    images: [ImageInfo; SLOT_COUNT],
    wireless: WirelessConfig,
}

/// The full catalog plus its generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Smaller is newer.
    pub generation: u32,
    pub images: [ImageInfo; SLOT_COUNT],
    pub wireless: WirelessConfig,
}

impl Default for Superblock {
    fn default() -> Self {
        Self::empty()
    }
}

impl Superblock {
    /// All slots absent, wireless unconfigured, never committed.
    pub fn empty() -> Self {
        Self {
            generation: INVALID_GENERATION,
            images: core::array::from_fn(|_| ImageInfo::absent()),
            wireless: WirelessConfig::not_configured(),
        }
    }

    /// Serialize into a full block image.
    pub fn encode(&self, block: &mut [u8; BLOCK_SIZE]) -> Result<(), StoreError> {
        block.fill(0xFF);
        let body = Body {
            images: self.images.clone(),
            wireless: self.wireless.clone(),
        };
        let used = postcard::to_slice(&body, &mut block[HEADER_LEN..])
            .map_err(|_| StoreError::Encode)?
            .len();
        let crc = crc16(&block[HEADER_LEN..HEADER_LEN + used]);
        block[0..4].copy_from_slice(&self.generation.to_le_bytes());
        block[4..6].copy_from_slice(&(used as u16).to_le_bytes());
        block[6..8].copy_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    /// Parse one copy. Returns `None` for unused, torn or corrupt copies.
    pub fn decode(block: &[u8]) -> Option<Self> {
        if block.len() < HEADER_LEN {
            return None;
        }
        let generation = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        if generation == INVALID_GENERATION {
            return None;
        }
        let len = usize::from(u16::from_le_bytes([block[4], block[5]]));
        let crc = u16::from_le_bytes([block[6], block[7]]);
        let body = block.get(HEADER_LEN..HEADER_LEN + len)?;
        if crc16(body) != crc {
            return None;
        }
        let body: Body = postcard::from_bytes(body).ok()?;
        Some(Self {
            generation,
            images: body.images,
            wireless: body.wireless,
        })
    }
}
