//! `PeerlinkNode` builder and accept loop.
//!
//! A node is one peer on the network: a WebSocket listener other peers dial,
//! a dialer that finds peers through a [`PeerDirectory`], and the session
//! that ties them together.

use std::net::SocketAddr;

use peerlink_protocol::{MsgPackCodec, PeerId};
use peerlink_session::{SessionConfig, SessionHandle, SessionManager};
use peerlink_transport::{
    PeerDirectory, TransportError, WebSocketConnection, WebSocketDialer, WebSocketTransport,
};

use crate::PeerlinkError;

/// Room on top of the largest file for the envelope around its payload.
const ENVELOPE_HEADROOM: usize = 64 * 1024;

/// Largest WebSocket message a node must accept so that a file of
/// `max_file_size` bytes arrives in one frame.
fn frame_limit(max_file_size: u64) -> usize {
    usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(ENVELOPE_HEADROOM)
}

/// Builder for configuring and starting a Peerlink node.
///
/// # Example
///
/// ```rust,no_run
/// use peerlink::prelude::*;
///
/// # async fn example() -> Result<(), PeerlinkError> {
/// let node = PeerlinkNode::builder()
///     .bind("0.0.0.0:9000")
///     .peer("abc123", "192.168.1.20:9000".parse().unwrap())
///     .build()
///     .await?;
///
/// let session = node.session();
/// tokio::spawn(node.run());
/// session.connect("abc123").await?;
/// session.send_message("hello").await?;
/// # Ok(())
/// # }
/// ```
pub struct PeerlinkNodeBuilder {
    bind_addr: String,
    peer_id: Option<PeerId>,
    peers: Vec<(PeerId, SocketAddr)>,
    session_config: SessionConfig,
}

impl PeerlinkNodeBuilder {
    /// Creates a new builder with default settings.
    ///
    /// Binds to an ephemeral port on localhost and picks a random id
    /// unless told otherwise.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            peer_id: None,
            peers: Vec::new(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Uses a fixed identifier instead of a random one.
    pub fn peer_id(mut self, id: impl Into<PeerId>) -> Self {
        self.peer_id = Some(id.into());
        self
    }

    /// Records where a known peer listens.
    pub fn peer(mut self, id: impl Into<PeerId>, addr: SocketAddr) -> Self {
        self.peers.push((id.into(), addr));
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the listener and starts the session.
    ///
    /// Uses `MsgPackCodec` on a WebSocket transport. Both the listener and
    /// the dialer accept messages large enough to carry a file of
    /// [`SessionConfig::max_file_size`] bytes.
    pub async fn build(self) -> Result<PeerlinkNode, PeerlinkError> {
        let id = self.peer_id.unwrap_or_else(PeerId::random);
        let limit = frame_limit(self.session_config.max_file_size);
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_max_message_size(limit);
        let local_addr = transport
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;

        let directory = PeerDirectory::new();
        for (peer, addr) in self.peers {
            directory.insert(peer.as_str(), addr);
        }

        let dialer =
            WebSocketDialer::new(id.as_str(), directory.clone()).with_max_message_size(limit);
        let session = SessionManager::spawn(id.clone(), dialer, MsgPackCodec, self.session_config);

        tracing::info!(peer_id = %id, addr = %local_addr, "peerlink node started");

        Ok(PeerlinkNode {
            id,
            local_addr,
            transport,
            session,
            directory,
        })
    }
}

impl Default for PeerlinkNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Peerlink peer.
///
/// Grab a [`session`](Self::session) handle to chat, then call
/// [`run()`](Self::run) to start accepting connections.
pub struct PeerlinkNode {
    id: PeerId,
    local_addr: SocketAddr,
    transport: WebSocketTransport,
    session: SessionHandle<WebSocketConnection>,
    directory: PeerDirectory,
}

impl PeerlinkNode {
    /// Creates a new builder.
    pub fn builder() -> PeerlinkNodeBuilder {
        PeerlinkNodeBuilder::new()
    }

    /// This node's identifier. Other peers dial it under this name.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle to this node's session.
    pub fn session(&self) -> SessionHandle<WebSocketConnection> {
        self.session.clone()
    }

    /// The directory used to find peers. Entries added after the node
    /// started are picked up by the next `connect`.
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Runs the accept loop.
    ///
    /// Every inbound connection replaces the session's current one. Runs
    /// until the listener shuts down or the session stops.
    pub async fn run(self) -> Result<(), PeerlinkError> {
        tracing::info!(peer_id = %self.id, "peerlink node accepting connections");
        self.session.serve(self.transport).await?;
        Ok(())
    }
}
