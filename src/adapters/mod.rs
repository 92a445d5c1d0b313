//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter           | Implements   | Connects to                      |
//! |-------------------|--------------|----------------------------------|
//! | `bus`             | BusPort      | Shared memory served to the CPU  |
//! | `flash`           | FlashPort    | Data partition / in-memory NOR   |
//! | `log_sink`        | EventSink    | Serial log output                |
//! | `stdio_transport` | Transport    | USB console / host stdio         |
//! | `tcp_transport`   | Transport    | Single-client TCP listener       |
//! | `time`            | DelayNs      | ROM delay / spin loop, uptime    |

pub mod bus;
pub mod flash;
pub mod log_sink;
pub mod stdio_transport;
pub mod tcp_transport;
pub mod time;
