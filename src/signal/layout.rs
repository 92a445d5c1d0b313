//! Address map of the signal region.
//!
//! ```text
//!  0xF000 ┌──────────────────────────────┐
//!         │ active area (297 bytes)      │  every read has a side effect
//!  0xF129 ├──────────────────────────────┤
//!         │ passive area (131 bytes)     │  plain data
//!  0xF1AC └──────────────────────────────┘
//!   ...
//!  0xFFFD   trampoline: 0x80 0xFE 0x00
//! ```

/// First address of the signal region.
pub const BASE: u16 = 0xF000;

/// Parking loop the legacy CPU spins in while an image is loaded.
pub const TRAMPOLINE: u16 = 0xFFFD;

/// Short branch to itself followed by a no-op.
pub const TRAMPOLINE_CODE: [u8; 3] = [0x80, 0xFE, 0x00];

/// Byte written over everything below the trampoline on release.
pub const NOP: u8 = 0x00;

// ── Active area offsets ──────────────────────────────────────

pub const RESET_COUNTER: u16 = 0;
pub const BOOT_REQUEST: u16 = 1;
pub const TUNNEL_SYNC1: u16 = 17;
pub const TUNNEL_SYNC2: u16 = 18;
pub const SEND_TABLE: u16 = 19;
pub const SEND_ACK: u16 = 275;
pub const RECV_LOCK: u16 = 276;
pub const RECV_UNLOCK: u16 = 277;
pub const CONFIG_CHANGED: u16 = 278;
pub const CONFIG_LOAD_SLOT: u16 = 279;
pub const CONFIG_LOAD_NETWORK: u16 = 295;
pub const CONFIG_LOAD_ACK: u16 = 296;

/// Size of the active area.
pub const ACTIVE_LEN: u16 = 297;

// ── Passive area offsets ─────────────────────────────────────

pub const DESIRED_STATE: u16 = 297;
pub const RECV_NONEMPTY: u16 = 298;
pub const RECV_DATA: u16 = 299;
pub const CONFIG_BLOCK: u16 = 300;

/// Size of the configuration block union.
pub const CONFIG_BLOCK_LEN: usize = 128;

/// Total size of the region.
pub const REGION_LEN: u16 = CONFIG_BLOCK + CONFIG_BLOCK_LEN as u16;

/// Number of per-slot boot and configuration cells.
pub const SLOTS: u16 = 16;

/// Absolute address of an offset.
pub const fn addr(offset: u16) -> u16 {
    BASE + offset
}

/// Whether `address` falls inside the active area.
pub const fn is_active(address: u16) -> bool {
    address >= BASE && address < BASE + ACTIVE_LEN
}

const _: () = assert!((BASE as u32) + (REGION_LEN as u32) <= TRAMPOLINE as u32);
