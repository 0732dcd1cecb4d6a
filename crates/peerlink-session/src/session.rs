//! Session configuration, connection state, and the events a session emits.

use peerlink_protocol::{FileMetadata, PeerId, TransferId};

use crate::ChatMessage;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Tunables for a session. `Default` gives values that suit a desktop chat.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the command channel between handles and the session
    /// task. Callers wait when it is full.
    pub command_buffer: usize,

    /// Capacity of the event broadcast. A subscriber that falls further
    /// behind than this skips the oldest events, including received files,
    /// and is told how many with `RecvError::Lagged`. Senders never wait.
    pub event_buffer: usize,

    /// Largest file [`send_file`](crate::SessionHandle::send_file) accepts,
    /// in bytes. Default: 100 MiB.
    pub max_file_size: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            event_buffer: 256,
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle of the session's single connection.
///
/// ```text
///   Idle ──connect/accept──→ Connecting ──open──→ Open
///                                │                 │
///                                └──close/error────┴──→ Closed
///
///   Closed ──connect/accept──→ Connecting
/// ```
///
/// A connect or accept in `Connecting` or `Open` replaces the current
/// connection; the newest one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Idle,
    /// A connection is being established.
    Connecting,
    /// Ready to carry messages and files.
    Open,
    /// The last connection ended. A new one may be started.
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// The state together with the peer it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// The remote peer while `Connecting` or `Open`, `None` otherwise.
    pub remote: Option<PeerId>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            remote: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Everything a UI needs to render a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A message to append to the chat log: text sent or received, a file
    /// the local user started sending, or a file that finished arriving.
    Message(ChatMessage),

    /// The remote peer announced a file. Its bytes have not arrived yet.
    TransferStarted {
        transfer_id: TransferId,
        metadata: FileMetadata,
    },

    /// A local file could not be read, so its payload was never sent.
    TransferAborted {
        transfer_id: TransferId,
        reason: String,
    },

    /// A new connection displaced the current one. Pending transfers of
    /// the previous connection are gone.
    ConnectionReplaced {
        previous: PeerId,
        replacement: PeerId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_file_size, 104_857_600);
        assert!(config.command_buffer > 0);
        assert!(config.event_buffer > 0);
    }

    #[test]
    fn test_connection_status_starts_idle() {
        let status = ConnectionStatus::default();
        assert_eq!(status.state, ConnectionState::Idle);
        assert!(!status.state.is_open());
        assert!(status.remote.is_none());
    }
}
