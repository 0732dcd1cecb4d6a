//! Transport abstraction layer for Peerlink.
//!
//! Provides the [`Transport`], [`Dialer`] and [`Connection`] traits that
//! abstract over the channel two peers talk through. A connection is
//! message-oriented, ordered and reliable: every [`Frame`] sent arrives
//! exactly once and in order, or the connection fails.
//!
//! # Implementations
//!
//! - [`MemoryNetwork`]: in-process channels, always available
//! - `WebSocketTransport` / `WebSocketDialer`: WebSocket via
//!   `tokio-tungstenite` (feature `websocket`, default)

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryConnection, MemoryDialer, MemoryListener, MemoryNetwork};
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_MAX_MESSAGE_SIZE, PeerDirectory, WebSocketConnection, WebSocketDialer,
    WebSocketTransport,
};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The native unit a connection carries.
///
/// A transport can move raw text or an opaque binary payload. Which one
/// a message uses is decided by the protocol layer, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 text message, delivered as-is.
    Text(String),
    /// A binary message (a structured payload encoded by a codec).
    Binary(Vec<u8>),
}

impl Frame {
    /// Number of payload bytes in this frame.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Opens outbound connections to remote peers by identifier.
pub trait Dialer: Send + Sync + 'static {
    /// The connection type produced by this dialer.
    type Connection: Connection;

    /// Opens a connection to the peer registered under `peer`.
    ///
    /// Resolves once the connection is ready to carry frames.
    fn connect(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// Sends a frame to the remote peer.
    fn send(
        &self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the identifier of the peer on the other end.
    fn peer(&self) -> &str;
}
