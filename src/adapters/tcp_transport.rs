//! Single-client TCP transport.
//!
//! Implements [`Transport`](crate::rpc::transport::Transport) over a
//! non-blocking `std::net` listener (lwIP sockets on ESP-IDF, the host
//! stack in the simulator).
//!
//! ## Connection model
//!
//! 1. `bind()` listens on `0.0.0.0:<port>` in non-blocking mode.
//! 2. `accept()` polls for an incoming connection. A new connection
//!    always wins: any previous client is dropped first.
//! 3. Reads are non-blocking: `read()` returns `Ok(0)` when nothing is
//!    pending.
//! 4. `disconnect()` closes the client and returns to `Listening`.

use core::fmt;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use log::{info, warn};

use crate::rpc::transport::Transport;

/// Default listen port for the packet protocol.
pub const DEFAULT_PORT: u16 = 3759;

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpTransportError {
    /// Socket I/O failure.
    Io,
    /// No client is connected.
    NotConnected,
    /// The peer stopped draining its receive buffer.
    Stalled,
}

impl fmt::Display for TcpTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "TCP/socket I/O error"),
            Self::NotConnected => write!(f, "no client connected"),
            Self::Stalled => write!(f, "client stopped reading"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Listening,
    Connected,
}

// ───────────────────────────────────────────────────────────────
// TcpTransport
// ───────────────────────────────────────────────────────────────

pub struct TcpTransport {
    listener: TcpListener,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Bind `0.0.0.0:<port>`. Port `0` lets the OS choose.
    pub fn bind(port: u16) -> Result<Self, TcpTransportError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).map_err(|_| TcpTransportError::Io)?;
        listener
            .set_nonblocking(true)
            .map_err(|_| TcpTransportError::Io)?;
        info!("TCP: listening on port {}", port);
        Ok(Self {
            listener,
            stream: None,
        })
    }

    pub fn state(&self) -> ConnectionState {
        if self.stream.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Listening
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TcpTransportError> {
        self.listener.local_addr().map_err(|_| TcpTransportError::Io)
    }

    /// Poll for a new client. Returns `true` if one was accepted.
    pub fn accept(&mut self) -> bool {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                if stream.set_nonblocking(true).is_err() {
                    warn!("TCP: failed to set non-blocking on client socket");
                    return false;
                }
                let _ = stream.set_nodelay(true);
                if self.stream.replace(stream).is_some() {
                    info!("TCP: previous client dropped for {}", addr);
                } else {
                    info!("TCP: client connected from {}", addr);
                }
                true
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) => {
                warn!("TCP: accept error: {}", e);
                false
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            info!("TCP: client disconnected");
        }
    }
}

impl Transport for TcpTransport {
    type Error = TcpTransportError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TcpTransportError> {
        let stream = self.stream.as_mut().ok_or(TcpTransportError::NotConnected)?;
        match stream.read(buf) {
            Ok(0) => {
                info!("TCP: client disconnected (EOF)");
                self.stream = None;
                Err(TcpTransportError::NotConnected)
            }
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(_) => {
                self.stream = None;
                Err(TcpTransportError::Io)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TcpTransportError> {
        let stream = self.stream.as_mut().ok_or(TcpTransportError::NotConnected)?;
        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(_) => {
                self.stream = None;
                Err(TcpTransportError::Io)
            }
        }
    }

    fn flush(&mut self) -> Result<(), TcpTransportError> {
        let stream = self.stream.as_mut().ok_or(TcpTransportError::NotConnected)?;
        stream.flush().map_err(|_| TcpTransportError::Io)
    }

    fn available(&self) -> bool {
        self.stream.is_some()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
