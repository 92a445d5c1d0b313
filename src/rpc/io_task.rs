//! Async network I/O task: a reactor-driven bridge between the TCP
//! transport and the control loop.
//!
//! Runs in a dedicated thread using `edge-executor` for cooperative
//! scheduling and `async-io-mini` timers (no busy-spinning). Three
//! concurrent futures share the transport:
//!
//! 1. **Accept**: polls for a new client every 50 ms and announces it
//!    with a fresh epoch.
//! 2. **Read**: polls the client every 1 ms and forwards bytes.
//! 3. **Write**: wakes on `REPLY_CHANNEL.receive().await` and sends
//!    replies addressed to the current epoch.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────┐
//!  │  rpc-io thread                                   │
//!  │  ┌────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor              │  │
//!  │  │  ┌─────────┐  ┌──────────┐  ┌───────────┐  │  │
//!  │  │  │ Accept  │  │ Read     │  │ Write     │  │  │
//!  │  │  │ 50ms ⏱  │  │ 1ms ⏱    │  │ on reply  │  │  │
//!  │  │  └─────────┘  └──────────┘  └───────────┘  │  │
//!  │  └────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────┘
//! ```

use core::cell::{Cell, RefCell};
use core::time::Duration;
use std::rc::Rc;

use heapless::Vec;
use log::{debug, info, warn};

use super::channels::{INBOUND_CHANNEL, INBOUND_CHUNK, Inbound, InboundChunk, REPLY_CHANNEL};
use super::transport::Transport;
use crate::adapters::tcp_transport::{TcpTransport, TcpTransportError};

/// Write retries (1 ms apart) before a client that stopped reading is dropped.
const WRITE_STALL_LIMIT: u32 = 1000;

/// Transport plus the connection epoch, shared by the three loops.
struct Link {
    transport: RefCell<TcpTransport>,
    epoch: Cell<u32>,
    /// Set while `Connected` for the current epoch is not yet queued.
    announcing: Cell<bool>,
}

type SharedLink = Rc<Link>;

// ── Async loops ──────────────────────────────────────────────

async fn accept_loop(link: SharedLink) {
    loop {
        let accepted = link.transport.borrow_mut().accept();
        if accepted {
            let epoch = link.epoch.get().wrapping_add(1);
            link.epoch.set(epoch);
            link.announcing.set(true);
            INBOUND_CHANNEL.send(Inbound::Connected(epoch)).await;
            link.announcing.set(false);
        }
        async_io_mini::Timer::after(Duration::from_millis(50)).await;
    }
}

async fn read_loop(link: SharedLink) {
    let mut buf = [0u8; INBOUND_CHUNK];
    loop {
        if !link.announcing.get() {
            let result = {
                let mut t = link.transport.borrow_mut();
                if t.is_connected() { Some(t.read(&mut buf)) } else { None }
            };
            match result {
                None | Some(Ok(0)) => {}
                Some(Ok(n)) => {
                    let mut data = Vec::new();
                    // `n` never exceeds the read buffer, which is one chunk.
                    let _ = data.extend_from_slice(&buf[..n]);
                    INBOUND_CHANNEL.send(Inbound::Data(InboundChunk { data })).await;
                }
                Some(Err(TcpTransportError::NotConnected)) => {
                    INBOUND_CHANNEL.send(Inbound::Disconnected).await;
                }
                Some(Err(e)) => {
                    warn!("IO: read failed: {}", e);
                    link.transport.borrow_mut().disconnect();
                    INBOUND_CHANNEL.send(Inbound::Disconnected).await;
                }
            }
        }
        async_io_mini::Timer::after(Duration::from_millis(1)).await;
    }
}

async fn write_loop(link: SharedLink) {
    loop {
        let reply = REPLY_CHANNEL.receive().await;
        if reply.epoch != link.epoch.get() || !link.transport.borrow().is_connected() {
            debug!("IO: dropping reply for client {}", reply.epoch);
            continue;
        }
        if let Err(e) = write_all(&link, reply.epoch, &reply.data).await {
            warn!("IO: write failed: {}", e);
            link.transport.borrow_mut().disconnect();
            INBOUND_CHANNEL.send(Inbound::Disconnected).await;
        }
    }
}

/// Write the whole frame, waiting while the socket buffer is full.
///
/// The transport is only borrowed for each attempt, so accept and read keep
/// running while a slow peer drains. A frame cut short by a new client is
/// abandoned.
async fn write_all(link: &Link, epoch: u32, mut data: &[u8]) -> Result<(), TcpTransportError> {
    let mut stalls = 0;
    while !data.is_empty() {
        if link.epoch.get() != epoch {
            return Ok(());
        }
        let n = link.transport.borrow_mut().write(data)?;
        if n == 0 {
            stalls += 1;
            if stalls > WRITE_STALL_LIMIT {
                return Err(TcpTransportError::Stalled);
            }
            async_io_mini::Timer::after(Duration::from_millis(1)).await;
            continue;
        }
        stalls = 0;
        data = &data[n..];
    }
    link.transport.borrow_mut().flush()
}

fn run_io_loop(transport: TcpTransport) {
    let executor: edge_executor::LocalExecutor<'_, 8> = edge_executor::LocalExecutor::new();
    let link: SharedLink = Rc::new(Link {
        transport: RefCell::new(transport),
        epoch: Cell::new(0),
        announcing: Cell::new(false),
    });

    executor.spawn(accept_loop(link.clone())).detach();
    executor.spawn(read_loop(link.clone())).detach();
    executor.spawn(write_loop(link)).detach();

    info!("IO task started (async, reactor-driven)");
    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

/// Spawn the I/O thread. It takes ownership of the transport.
pub fn spawn(transport: TcpTransport) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("rpc-io".into())
        .stack_size(16 * 1024)
        .spawn(move || run_io_loop(transport))
}
