//! Transport-agnostic packet protocol.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Packet stack                        │
//! │                                                        │
//! │  ┌───────────┐   ┌──────────┐   ┌──────────────────┐   │
//! │  │ Transport │──▶│  Codec   │──▶│ Engine           │   │
//! │  │ (trait)   │   │ (framing)│   │ → EmulatorService│   │
//! │  └───────────┘   └──────────┘   └──────────────────┘   │
//! │       ▲                                  │             │
//! │       └───────────── reply frame ────────┘             │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The network transport runs on its own thread ([`io_task`]) and talks
//! to the control loop through [`channels`].

pub mod channels;
pub mod codec;
pub mod engine;
pub mod io_task;
pub mod packet;
pub mod transport;
