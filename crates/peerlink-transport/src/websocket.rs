//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The dialing side announces its own peer id as the request path
//! (`ws://host:port/<peer-id>`); the listener reads it during the upgrade
//! so both ends know who they are talking to before the first frame.
//!
//! Every frame travels as a single WebSocket message, so the inbound size
//! limit bounds the largest frame a peer can receive. Both sides default to
//! [`DEFAULT_MAX_MESSAGE_SIZE`]; raise it with `with_max_message_size` when
//! larger payloads are expected.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Dialer, Frame, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Largest inbound message accepted unless configured otherwise (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 20;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Limits applied to one WebSocket stream. A frame carries a whole message,
/// so the frame limit matches the message limit.
fn ws_config(max_message_size: usize) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(max_message_size))
        .max_frame_size(Some(max_message_size))
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            config: ws_config(DEFAULT_MAX_MESSAGE_SIZE),
        })
    }

    /// Sets the largest message, in bytes, accepted from a peer.
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.config = ws_config(bytes);
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn accept(&mut self) -> Result<WebSocketConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let mut peer = String::new();
        let ws = tokio_tungstenite::accept_hdr_async_with_config(
            MaybeTlsStream::Plain(stream),
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                peer = req.uri().path().trim_matches('/').to_string();
                Ok(resp)
            },
            Some(self.config),
        )
        .await
        .map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        if peer.is_empty() {
            return Err(TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "dialer did not announce a peer id",
            )));
        }

        let conn = WebSocketConnection::new(peer, ws);
        tracing::debug!(id = %conn.id, peer = %conn.peer, %addr, "accepted WebSocket connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Maps peer ids to the socket addresses they listen on.
///
/// Stands in for a signaling service: whoever embeds the transport fills
/// it in. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    entries: Arc<RwLock<HashMap<String, SocketAddr>>>,
}

impl PeerDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the address of `peer`.
    pub fn insert(&self, peer: impl Into<String>, addr: SocketAddr) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.into(), addr);
    }

    /// Forgets `peer`. Returns its last known address.
    pub fn remove(&self, peer: &str) -> Option<SocketAddr> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer)
    }

    /// Looks up the address of `peer`.
    pub fn resolve(&self, peer: &str) -> Option<SocketAddr> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
            .copied()
    }
}

/// Opens WebSocket connections to peers listed in a [`PeerDirectory`].
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    local: String,
    directory: PeerDirectory,
    config: WebSocketConfig,
}

impl WebSocketDialer {
    /// Creates a dialer that announces itself as `local`.
    pub fn new(local: impl Into<String>, directory: PeerDirectory) -> Self {
        Self {
            local: local.into(),
            directory,
            config: ws_config(DEFAULT_MAX_MESSAGE_SIZE),
        }
    }

    /// Sets the largest message, in bytes, accepted from a peer.
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.config = ws_config(bytes);
        self
    }
}

impl Dialer for WebSocketDialer {
    type Connection = WebSocketConnection;

    async fn connect(&self, peer: &str) -> Result<WebSocketConnection, TransportError> {
        let addr = self
            .directory
            .resolve(peer)
            .ok_or_else(|| TransportError::Unreachable(peer.to_string()))?;

        let url = format!("ws://{addr}/{}", self.local);
        let (ws, _) =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(self.config), false)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    peer: peer.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e),
                })?;

        let conn = WebSocketConnection::new(peer.to_string(), ws);
        tracing::debug!(id = %conn.id, peer, %addr, "opened WebSocket connection");
        Ok(conn)
    }
}

/// A single WebSocket connection.
///
/// The sink and stream halves are locked separately so a task parked in
/// `recv` never holds up `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    fn new(peer: String, ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            peer,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl Connection for WebSocketConnection {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Frame::Binary(data.into())));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_insert_resolve_remove() {
        let directory = PeerDirectory::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        directory.insert("abc123", addr);
        assert_eq!(directory.resolve("abc123"), Some(addr));

        // Clones share the table.
        let clone = directory.clone();
        assert_eq!(clone.remove("abc123"), Some(addr));
        assert_eq!(directory.resolve("abc123"), None);
    }

    #[test]
    fn test_ws_config_frame_limit_matches_message_limit() {
        let config = ws_config(100 << 20);
        assert_eq!(config.max_message_size, Some(100 << 20));
        assert_eq!(config.max_frame_size, Some(100 << 20));

        let dialer = WebSocketDialer::new("me", PeerDirectory::new()).with_max_message_size(1024);
        assert_eq!(dialer.config.max_frame_size, Some(1024));
    }

    #[tokio::test]
    async fn test_dial_unknown_peer_is_unreachable() {
        let dialer = WebSocketDialer::new("me", PeerDirectory::new());

        let result = dialer.connect("ghost").await;

        assert!(matches!(result, Err(TransportError::Unreachable(p)) if p == "ghost"));
    }
}
