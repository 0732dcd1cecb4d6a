//! In-process transport built on Tokio channels.
//!
//! A [`MemoryNetwork`] is a registry of listeners keyed by peer id. Dialing
//! a registered id creates a connected pair of [`MemoryConnection`]s, one
//! handed to the dialer and one delivered to the listener's `accept`.
//! Frames travel over unbounded channels, so ordering and reliability hold
//! for as long as both halves live.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{Connection, ConnectionId, Dialer, Frame, Transport, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type Registry = HashMap<String, mpsc::UnboundedSender<MemoryConnection>>;

/// A shared registry of in-process listeners.
///
/// Cloning is cheap; clones see the same registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    listeners: Arc<Mutex<Registry>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `peer`, replacing any previous one.
    pub fn listen(&self, peer: &str) -> MemoryListener {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry().insert(peer.to_string(), tx);
        tracing::debug!(peer, "memory listener registered");
        MemoryListener {
            peer: peer.to_string(),
            incoming: rx,
            network: self.clone(),
        }
    }

    /// Returns a dialer that announces itself as `local`.
    pub fn dialer(&self, local: &str) -> MemoryDialer {
        MemoryDialer {
            local: local.to_string(),
            network: self.clone(),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The accepting side of a [`MemoryNetwork`] registration.
#[derive(Debug)]
pub struct MemoryListener {
    peer: String,
    incoming: mpsc::UnboundedReceiver<MemoryConnection>,
    network: MemoryNetwork,
}

impl Transport for MemoryListener {
    type Connection = MemoryConnection;

    async fn accept(&mut self) -> Result<MemoryConnection, TransportError> {
        self.incoming.recv().await.ok_or(TransportError::Shutdown)
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.network.registry().remove(&self.peer);
        Ok(())
    }
}

/// Opens connections to listeners on a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryDialer {
    local: String,
    network: MemoryNetwork,
}

impl Dialer for MemoryDialer {
    type Connection = MemoryConnection;

    async fn connect(&self, peer: &str) -> Result<MemoryConnection, TransportError> {
        let listener = self
            .network
            .registry()
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(peer.to_string()))?;

        let (to_remote, from_local) = mpsc::unbounded_channel();
        let (to_local, from_remote) = mpsc::unbounded_channel();

        let local = MemoryConnection::new(peer, to_remote, from_remote);
        let remote = MemoryConnection::new(&self.local, to_local, from_local);

        listener
            .send(remote)
            .map_err(|_| TransportError::Unreachable(peer.to_string()))?;

        tracing::debug!(id = %local.id, peer, "memory connection opened");
        Ok(local)
    }
}

/// One half of an in-process connection.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    peer: String,
    /// `None` once this half has been closed.
    outgoing: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl MemoryConnection {
    fn new(
        peer: &str,
        outgoing: mpsc::UnboundedSender<Frame>,
        incoming: mpsc::UnboundedReceiver<Frame>,
    ) -> Self {
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            peer: peer.to_string(),
            outgoing: Mutex::new(Some(outgoing)),
            incoming: tokio::sync::Mutex::new(incoming),
        }
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let outgoing = self.outgoing.lock().unwrap_or_else(PoisonError::into_inner);
        match outgoing.as_ref() {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| TransportError::ConnectionClosed("peer hung up".into())),
            None => Err(TransportError::ConnectionClosed("closed locally".into())),
        }
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        Ok(self.incoming.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}
