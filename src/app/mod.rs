//! Application core: domain logic with all I/O behind port traits.
//!
//! This module contains the emulator's rules: the menu lifecycle, boot
//! handoff, and the store operations requested over the packet protocol.
//! All interaction with the bus and flash happens through the traits in
//! [`ports`], keeping this layer testable without hardware.

pub mod events;
pub mod ports;
pub mod service;
