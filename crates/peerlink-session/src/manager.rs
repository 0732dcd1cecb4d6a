//! The session actor and its handle.
//!
//! One Tokio task owns everything about a session: the current connection,
//! the pending-transfer table, and the lifecycle state. Callers talk to it
//! through a [`SessionHandle`]; connection tasks (dialing, reading frames,
//! reading a local file) report back over an internal channel. Because only
//! the actor touches the state, no locks are needed.
//!
//! ```text
//! SessionHandle ──Command───→ ┌────────────────┐ ──SessionEvent──→ subscribers
//!                             │ SessionManager │ ──status/bool───→ watchers
//! link tasks ───LinkEvent───→ └────────────────┘
//! ```
//!
//! Every connection gets an increasing epoch. Link events carry the epoch
//! they were produced under and are ignored once that connection has been
//! replaced or closed, so nothing from an old connection leaks into the
//! next one.

use std::io;
use std::sync::Arc;

use peerlink_protocol::{Codec, Envelope, EnvelopeCodec, FileMetadata, PeerId, TransferId};
use peerlink_transport::{Connection, Dialer, Frame, Transport, TransportError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::{
    ChatMessage, ConnectionState, ConnectionStatus, FileSource, Origin, SessionConfig,
    SessionError, SessionEvent, TransferTable,
};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// The receiving ends the session task reads from.
type Inboxes<C> = (
    mpsc::Receiver<Command<C>>,
    mpsc::UnboundedReceiver<LinkEvent<C>>,
);

/// Requests from handles to the session task.
pub(crate) enum Command<C> {
    Connect { remote: PeerId, reply: Reply<()> },
    Accept { conn: C, reply: oneshot::Sender<()> },
    SendMessage { text: String, reply: Reply<ChatMessage> },
    SendFile { file: FileSource, reply: Reply<TransferId> },
    Disconnect { reply: oneshot::Sender<()> },
}

/// Reports from tasks working on behalf of one connection.
enum LinkEvent<C> {
    Opened {
        epoch: u64,
        conn: C,
    },
    ConnectFailed {
        epoch: u64,
        error: TransportError,
    },
    Frame {
        epoch: u64,
        frame: Frame,
    },
    Closed {
        epoch: u64,
    },
    Failed {
        epoch: u64,
        error: TransportError,
    },
    FileRead {
        epoch: u64,
        metadata: FileMetadata,
        result: io::Result<Vec<u8>>,
    },
}

/// The current connection. Exists while `Connecting` or `Open`.
struct Link<C> {
    epoch: u64,
    remote: PeerId,
    conn: Option<Arc<C>>,
    reader: Option<JoinHandle<()>>,
    /// The caller of an outbound `connect` waiting for the dial to finish.
    pending_connect: Option<Reply<()>>,
}

// ---------------------------------------------------------------------------
// SessionManager (the actor)
// ---------------------------------------------------------------------------

/// Owns a session's connection and transfer state.
///
/// Never held directly: [`spawn`](Self::spawn) moves it into its own task
/// and hands back a [`SessionHandle`].
pub struct SessionManager<D: Dialer, K: Codec> {
    local_id: PeerId,
    dialer: Arc<D>,
    codec: EnvelopeCodec<K>,
    config: SessionConfig,
    state: ConnectionState,
    link: Option<Link<D::Connection>>,
    next_epoch: u64,
    transfers: TransferTable,
    link_tx: mpsc::UnboundedSender<LinkEvent<D::Connection>>,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Sender<ConnectionStatus>,
    connected: watch::Sender<bool>,
}

impl<D: Dialer, K: Codec> SessionManager<D, K> {
    /// Starts a session task for `local_id` and returns a handle to it.
    ///
    /// `dialer` opens outbound connections; inbound ones are handed over
    /// with [`SessionHandle::accept`] or [`SessionHandle::serve`]. The task
    /// stops once every handle has been dropped.
    pub fn spawn(
        local_id: PeerId,
        dialer: D,
        codec: K,
        config: SessionConfig,
    ) -> SessionHandle<D::Connection> {
        let (actor, handle, (commands, link_events)) = Self::new(local_id, dialer, codec, config);
        tokio::spawn(actor.run(commands, link_events));
        handle
    }

    fn new(
        local_id: PeerId,
        dialer: D,
        codec: K,
        config: SessionConfig,
    ) -> (Self, SessionHandle<D::Connection>, Inboxes<D::Connection>) {
        let (tx, rx) = mpsc::channel(config.command_buffer);
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_buffer);
        let (status, status_rx) = watch::channel(ConnectionStatus::default());
        let (connected, connected_rx) = watch::channel(false);

        let actor = SessionManager {
            local_id: local_id.clone(),
            dialer: Arc::new(dialer),
            codec: EnvelopeCodec::new(codec),
            config,
            state: ConnectionState::Idle,
            link: None,
            next_epoch: 1,
            transfers: TransferTable::new(),
            link_tx,
            events: events.clone(),
            status,
            connected,
        };

        let handle = SessionHandle {
            local_id,
            sender: tx,
            events,
            status: status_rx,
            connected: connected_rx,
        };
        (actor, handle, (rx, link_rx))
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command<D::Connection>>,
        mut link_events: mpsc::UnboundedReceiver<LinkEvent<D::Connection>>,
    ) {
        tracing::info!(peer_id = %self.local_id, "session started");

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd).await;
                }
                Some(event) = link_events.recv() => {
                    self.handle_link_event(event).await;
                }
            }
        }

        if self.link.is_some() {
            self.close_link();
        }
        tracing::info!(peer_id = %self.local_id, "session stopped");
    }

    async fn handle_command(&mut self, cmd: Command<D::Connection>) {
        match cmd {
            Command::Connect { remote, reply } => self.handle_connect(remote, reply),
            Command::Accept { conn, reply } => {
                self.handle_accept(conn);
                let _ = reply.send(());
            }
            Command::SendMessage { text, reply } => {
                let result = self.handle_send_message(text).await;
                let _ = reply.send(result);
            }
            Command::SendFile { file, reply } => {
                let result = self.handle_send_file(file).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                if let Some(link) = &self.link {
                    tracing::info!(peer = %link.remote, "disconnecting");
                    self.close_link();
                }
                let _ = reply.send(());
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent<D::Connection>) {
        match event {
            LinkEvent::Opened { epoch, conn } => self.on_opened(epoch, conn),
            LinkEvent::ConnectFailed { epoch, error } => {
                if self.is_current(epoch) {
                    tracing::warn!(error = %error, "connection attempt failed");
                }
                self.link_lost(epoch, error);
            }
            LinkEvent::Frame { epoch, frame } => {
                if self.is_current(epoch) {
                    self.on_frame(frame);
                } else {
                    tracing::debug!(epoch, "dropping frame from a stale connection");
                }
            }
            LinkEvent::Closed { epoch } => {
                if self.is_current(epoch) {
                    tracing::info!("connection closed by peer");
                }
                self.link_lost(
                    epoch,
                    TransportError::ConnectionClosed("closed by peer".into()),
                );
            }
            LinkEvent::Failed { epoch, error } => {
                if self.is_current(epoch) {
                    tracing::warn!(error = %error, "connection failed");
                }
                self.link_lost(epoch, error);
            }
            LinkEvent::FileRead {
                epoch,
                metadata,
                result,
            } => self.on_file_read(epoch, metadata, result).await,
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    fn handle_connect(&mut self, remote: PeerId, reply: Reply<()>) {
        let epoch = self.replace_link(&remote);
        tracing::info!(peer = %remote, epoch, "connecting");

        self.link = Some(Link {
            epoch,
            remote: remote.clone(),
            conn: None,
            reader: None,
            pending_connect: Some(reply),
        });
        self.set_state(ConnectionState::Connecting, Some(remote.clone()));

        let dialer = Arc::clone(&self.dialer);
        let link_tx = self.link_tx.clone();
        tokio::spawn(async move {
            let event = match dialer.connect(remote.as_str()).await {
                Ok(conn) => LinkEvent::Opened { epoch, conn },
                Err(error) => LinkEvent::ConnectFailed { epoch, error },
            };
            let _ = link_tx.send(event);
        });
    }

    fn handle_accept(&mut self, conn: D::Connection) {
        let remote = PeerId::from(conn.peer());
        let epoch = self.replace_link(&remote);
        tracing::info!(peer = %remote, conn = %conn.id(), epoch, "accepted connection");

        self.link = Some(Link {
            epoch,
            remote: remote.clone(),
            conn: None,
            reader: None,
            pending_connect: None,
        });
        self.set_state(ConnectionState::Connecting, Some(remote));
        self.on_opened(epoch, conn);
    }

    /// Tears down the current connection, if any, to make room for one to
    /// `remote`. Returns the epoch for the new connection.
    fn replace_link(&mut self, remote: &PeerId) -> u64 {
        if let Some(old) = self.link.take() {
            tracing::warn!(previous = %old.remote, replacement = %remote, "replacing current connection");
            self.emit(SessionEvent::ConnectionReplaced {
                previous: old.remote.clone(),
                replacement: remote.clone(),
            });
            teardown(old);
        }
        self.transfers.reset();

        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    fn on_opened(&mut self, epoch: u64, conn: D::Connection) {
        let link_tx = self.link_tx.clone();
        let Some(link) = self.link.as_mut().filter(|link| link.epoch == epoch) else {
            tracing::debug!(epoch, "closing connection that opened after it was replaced");
            close_in_background(Arc::new(conn));
            return;
        };

        let conn = Arc::new(conn);
        link.reader = Some(spawn_reader(epoch, Arc::clone(&conn), link_tx));
        link.conn = Some(conn);
        let reply = link.pending_connect.take();
        let remote = link.remote.clone();

        tracing::info!(peer = %remote, epoch, "connection open");
        self.set_state(ConnectionState::Open, Some(remote));
        if let Some(reply) = reply {
            let _ = reply.send(Ok(()));
        }
    }

    /// Handles the end of connection `epoch`. Ignored if that connection is
    /// no longer current.
    fn link_lost(&mut self, epoch: u64, error: TransportError) {
        if !self.is_current(epoch) {
            tracing::debug!(epoch, "ignoring loss of a stale connection");
            return;
        }
        let reply = self
            .link
            .as_mut()
            .and_then(|link| link.pending_connect.take());
        self.close_link();
        if let Some(reply) = reply {
            let _ = reply.send(Err(error.into()));
        }
    }

    /// Drops the current connection and every pending transfer, then moves
    /// to `Closed`.
    fn close_link(&mut self) {
        if let Some(link) = self.link.take() {
            teardown(link);
        }
        let dropped = self.transfers.reset();
        if dropped > 0 {
            tracing::info!(dropped, "incomplete transfers discarded");
        }
        self.set_state(ConnectionState::Closed, None);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.link.as_ref().is_some_and(|link| link.epoch == epoch)
    }

    /// The open connection and its epoch.
    fn open_connection(&self) -> Result<(u64, Arc<D::Connection>), SessionError> {
        if !self.state.is_open() {
            return Err(SessionError::NotConnected);
        }
        self.link
            .as_ref()
            .and_then(|link| link.conn.as_ref().map(|conn| (link.epoch, Arc::clone(conn))))
            .ok_or(SessionError::NotConnected)
    }

    fn set_state(&mut self, state: ConnectionState, remote: Option<PeerId>) {
        self.state = state;
        self.status.send_replace(ConnectionStatus { state, remote });
        self.connected.send_if_modified(|connected| {
            let open = state.is_open();
            let changed = *connected != open;
            *connected = open;
            changed
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Incoming
    // -----------------------------------------------------------------------

    fn on_frame(&mut self, frame: Frame) {
        let envelope = match self.codec.decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed envelope");
                return;
            }
        };
        tracing::debug!(kind = envelope.kind(), "envelope received");

        match envelope {
            Envelope::Text { content } => {
                self.emit(SessionEvent::Message(ChatMessage::text(
                    Origin::Remote,
                    content,
                )));
            }
            Envelope::FileMetadata(metadata) => {
                self.transfers.on_metadata(metadata.clone());
                self.emit(SessionEvent::TransferStarted {
                    transfer_id: metadata.id.clone(),
                    metadata,
                });
            }
            Envelope::FileData { transfer_id, bytes } => {
                match self.transfers.on_data(&transfer_id, bytes) {
                    Ok(file) => {
                        tracing::info!(
                            transfer_id = %transfer_id,
                            name = %file.metadata.name,
                            size = file.bytes.len(),
                            "file received"
                        );
                        self.emit(SessionEvent::Message(ChatMessage::file(
                            Origin::Remote,
                            file.metadata,
                            Some(Arc::from(file.bytes)),
                        )));
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping orphaned payload"),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outgoing
    // -----------------------------------------------------------------------

    async fn handle_send_message(&mut self, text: String) -> Result<ChatMessage, SessionError> {
        let (_, conn) = self.open_connection()?;
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let frame = self.codec.encode_text(&text);
        self.transmit(&conn, frame).await?;

        let message = ChatMessage::text(Origin::Local, text);
        self.emit(SessionEvent::Message(message.clone()));
        Ok(message)
    }

    /// Announces the file and logs it locally right away. The payload
    /// follows once a background read completes.
    async fn handle_send_file(&mut self, file: FileSource) -> Result<TransferId, SessionError> {
        let (epoch, conn) = self.open_connection()?;
        if file.size() > self.config.max_file_size {
            return Err(SessionError::FileTooLarge {
                name: file.name().to_string(),
                size: file.size(),
                limit: self.config.max_file_size,
            });
        }

        let transfer_id = TransferId::random();
        let metadata = file.metadata(transfer_id.clone());
        let frame = self.codec.encode_metadata(&metadata)?;
        self.transmit(&conn, frame).await?;
        tracing::info!(transfer_id = %transfer_id, name = %metadata.name, size = metadata.size, "sending file");

        self.emit(SessionEvent::Message(ChatMessage::file(
            Origin::Local,
            metadata.clone(),
            None,
        )));

        let link_tx = self.link_tx.clone();
        tokio::spawn(async move {
            let result = file.read().await;
            let _ = link_tx.send(LinkEvent::FileRead {
                epoch,
                metadata,
                result,
            });
        });

        Ok(transfer_id)
    }

    async fn on_file_read(
        &mut self,
        epoch: u64,
        metadata: FileMetadata,
        result: io::Result<Vec<u8>>,
    ) {
        let transfer_id = metadata.id;
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(transfer_id = %transfer_id, error = %e, "could not read file");
                self.emit(SessionEvent::TransferAborted {
                    transfer_id,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let conn = match self.open_connection() {
            Ok((current, conn)) if current == epoch => conn,
            _ => {
                tracing::debug!(transfer_id = %transfer_id, "connection gone, dropping file payload");
                return;
            }
        };

        let frame = match self.codec.encode_data(&transfer_id, bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(transfer_id = %transfer_id, error = %e, "could not encode file payload");
                self.emit(SessionEvent::TransferAborted {
                    transfer_id,
                    reason: e.to_string(),
                });
                return;
            }
        };

        if self.transmit(&conn, frame).await.is_ok() {
            tracing::debug!(transfer_id = %transfer_id, "file payload sent");
        }
    }

    /// Sends a frame. A failure closes the connection.
    async fn transmit(&mut self, conn: &D::Connection, frame: Frame) -> Result<(), SessionError> {
        if let Err(error) = conn.send(frame).await {
            tracing::warn!(peer = conn.peer(), error = %error, "send failed, closing connection");
            self.close_link();
            return Err(error.into());
        }
        Ok(())
    }
}

/// Forwards every frame from `conn` to the session until the connection
/// ends.
fn spawn_reader<C: Connection>(
    epoch: u64,
    conn: Arc<C>,
    link_tx: mpsc::UnboundedSender<LinkEvent<C>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match conn.recv().await {
                Ok(Some(frame)) => LinkEvent::Frame { epoch, frame },
                Ok(None) => LinkEvent::Closed { epoch },
                Err(error) => LinkEvent::Failed { epoch, error },
            };
            let done = !matches!(event, LinkEvent::Frame { .. });
            if link_tx.send(event).is_err() || done {
                break;
            }
        }
    })
}

fn teardown<C: Connection>(mut link: Link<C>) {
    if let Some(reader) = link.reader.take() {
        reader.abort();
    }
    if let Some(reply) = link.pending_connect.take() {
        let _ = reply.send(Err(SessionError::Transport(TransportError::ConnectionClosed(
            "superseded before it opened".into(),
        ))));
    }
    if let Some(conn) = link.conn.take() {
        close_in_background(conn);
    }
}

fn close_in_background<C: Connection>(conn: Arc<C>) {
    tokio::spawn(async move {
        if let Err(e) = conn.close().await {
            tracing::debug!(conn = %conn.id(), error = %e, "error while closing connection");
        }
    });
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// A cheap, cloneable handle to a running session.
///
/// All methods go through the session task, so calls from different
/// clones are applied one at a time in arrival order.
pub struct SessionHandle<C> {
    local_id: PeerId,
    sender: mpsc::Sender<Command<C>>,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Receiver<ConnectionStatus>,
    connected: watch::Receiver<bool>,
}

impl<C> Clone for SessionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            local_id: self.local_id.clone(),
            sender: self.sender.clone(),
            events: self.events.clone(),
            status: self.status.clone(),
            connected: self.connected.clone(),
        }
    }
}

impl<C: Connection> SessionHandle<C> {
    /// This peer's identifier.
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Connects to `remote`, replacing any current connection.
    ///
    /// Resolves once the connection is open.
    ///
    /// # Errors
    /// [`SessionError::Transport`] if the dial fails or the attempt is
    /// displaced by a newer connection before it opens. The session is
    /// left `Closed` in the first case.
    pub async fn connect(&self, remote: impl Into<PeerId>) -> Result<(), SessionError> {
        let remote = remote.into();
        self.request(|reply| Command::Connect { remote, reply }).await?
    }

    /// Adopts an inbound connection, replacing any current one.
    pub async fn accept(&self, conn: C) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(Command::Accept { conn, reply })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Accepts inbound connections from `transport` until it shuts down.
    ///
    /// Each accepted connection replaces the current one. Failed accepts
    /// are logged and skipped.
    pub async fn serve<T>(&self, mut transport: T) -> Result<(), SessionError>
    where
        T: Transport<Connection = C>,
    {
        loop {
            match transport.accept().await {
                Ok(conn) => self.accept(conn).await?,
                Err(TransportError::Shutdown) => {
                    tracing::info!("listener shut down");
                    return Ok(());
                }
                Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
            }
        }
    }

    /// Sends a chat message and returns the local copy that was logged.
    ///
    /// # Errors
    /// - [`SessionError::NotConnected`] when no connection is open
    /// - [`SessionError::EmptyMessage`] when `text` is blank
    /// - [`SessionError::Transport`] when sending fails
    pub async fn send_message(&self, text: impl Into<String>) -> Result<ChatMessage, SessionError> {
        let text = text.into();
        self.request(|reply| Command::SendMessage { text, reply }).await?
    }

    /// Starts sending a file and returns its transfer id.
    ///
    /// Resolves as soon as the metadata is out. The payload is sent after
    /// the file has been read; if that read fails a
    /// [`SessionEvent::TransferAborted`] is emitted.
    ///
    /// # Errors
    /// - [`SessionError::NotConnected`] when no connection is open
    /// - [`SessionError::FileTooLarge`] when the file exceeds
    ///   [`SessionConfig::max_file_size`]
    /// - [`SessionError::Transport`] when sending fails
    pub async fn send_file(&self, file: FileSource) -> Result<TransferId, SessionError> {
        self.request(|reply| Command::SendFile { file, reply }).await?
    }

    /// Closes the current connection, if any.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(Command::Disconnect { reply })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Subscribes to session events from this point on.
    ///
    /// The session never waits for subscribers. One that falls more than
    /// [`SessionConfig::event_buffer`] events behind loses the oldest ones:
    /// its next `recv` returns [`broadcast::error::RecvError::Lagged`] with
    /// the number skipped, then resumes with the oldest event still held.
    /// Received files arrive as events, so a subscriber that must not miss
    /// one should drain promptly or raise `event_buffer`.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Watches whether a connection is open.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Watches the connection state and remote peer.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command<C>,
    ) -> Result<Result<T, SessionError>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        rx.await.map_err(|_| SessionError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use peerlink_protocol::MsgPackCodec;
    use peerlink_transport::{MemoryConnection, MemoryDialer, MemoryListener, MemoryNetwork};

    use super::*;

    type Manager = SessionManager<MemoryDialer, MsgPackCodec>;

    /// A session for `"me"` driven by hand, with no task behind it.
    fn manager(
        network: &MemoryNetwork,
    ) -> (
        Manager,
        SessionHandle<MemoryConnection>,
        Inboxes<MemoryConnection>,
    ) {
        Manager::new(
            PeerId::new("me"),
            network.dialer("me"),
            MsgPackCodec,
            SessionConfig::default(),
        )
    }

    /// Hands the session a new inbound connection from `from` and returns
    /// the far end.
    async fn accept_from(
        manager: &mut Manager,
        network: &MemoryNetwork,
        listener: &mut MemoryListener,
        from: &str,
    ) -> MemoryConnection {
        let far = network.dialer(from).connect("me").await.unwrap();
        let near = listener.accept().await.unwrap();
        manager.handle_accept(near);
        far
    }

    fn metadata(id: &str) -> FileMetadata {
        FileMetadata {
            id: TransferId::new(id),
            name: "x.txt".into(),
            size: 3,
            mime_type: "text/plain".into(),
        }
    }

    /// Asserts the next frame `far` receives is the payload for `expected`.
    async fn assert_next_payload(manager: &Manager, far: &MemoryConnection, expected: &str) {
        let frame = far.recv().await.unwrap().expect("a frame");
        match manager.codec.decode(frame).unwrap() {
            Envelope::FileData { transfer_id, bytes } => {
                assert_eq!(transfer_id, TransferId::new(expected));
                assert_eq!(bytes, vec![1, 2, 3]);
            }
            other => panic!("expected a payload, got {}", other.kind()),
        }
    }

    // =========================================================================
    // Deferred file reads
    // =========================================================================

    #[tokio::test]
    async fn test_on_file_read_after_reconnect_drops_stale_payload() {
        let network = MemoryNetwork::new();
        let mut listener = network.listen("me");
        let (mut manager, _handle, _inboxes) = manager(&network);

        let first = accept_from(&mut manager, &network, &mut listener, "aaaaaa").await;
        let (old_epoch, _) = manager.open_connection().unwrap();
        manager.close_link();
        let second = accept_from(&mut manager, &network, &mut listener, "aaaaaa").await;

        // A read started on the first connection finishes now.
        manager
            .on_file_read(old_epoch, metadata("t1"), Ok(vec![1, 2, 3]))
            .await;
        let (epoch, _) = manager.open_connection().unwrap();
        manager
            .on_file_read(epoch, metadata("t2"), Ok(vec![1, 2, 3]))
            .await;

        assert_next_payload(&manager, &second, "t2").await;
        assert_eq!(first.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_on_file_read_after_replacement_drops_stale_payload() {
        let network = MemoryNetwork::new();
        let mut listener = network.listen("me");
        let (mut manager, _handle, _inboxes) = manager(&network);

        let first = accept_from(&mut manager, &network, &mut listener, "aaaaaa").await;
        let (old_epoch, _) = manager.open_connection().unwrap();
        let second = accept_from(&mut manager, &network, &mut listener, "cccccc").await;

        manager
            .on_file_read(old_epoch, metadata("t1"), Ok(vec![1, 2, 3]))
            .await;
        let (epoch, _) = manager.open_connection().unwrap();
        assert_ne!(epoch, old_epoch);
        manager
            .on_file_read(epoch, metadata("t2"), Ok(vec![1, 2, 3]))
            .await;

        assert_next_payload(&manager, &second, "t2").await;
        assert_eq!(first.recv().await.unwrap(), None);
    }
}
