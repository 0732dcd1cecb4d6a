//! Error types for the session layer.

use peerlink_protocol::{ProtocolError, TransferId};
use peerlink_transport::TransportError;

/// Errors raised by the file transfer state machine.
///
/// Never fatal and never returned to callers: the session logs them and
/// keeps the connection up.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// File data arrived with no pending metadata for its transfer id.
    /// The metadata never came, was already consumed, or was purged by a
    /// connection reset.
    #[error("no pending metadata for transfer {0}")]
    Orphaned(TransferId),
}

/// Errors returned by [`SessionHandle`](crate::SessionHandle) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs an open connection and there is none.
    #[error("not connected to a peer")]
    NotConnected,

    /// The message had no visible content.
    #[error("message is empty")]
    EmptyMessage,

    /// The file exceeds the configured transfer limit.
    #[error("file {name} is {size} bytes, the limit is {limit}")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// An envelope could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection failed. The session has already moved to `Closed`.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session task has stopped and no longer takes commands.
    #[error("session is no longer running")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphaned_display_names_transfer() {
        let err = TransferError::Orphaned(TransferId::new("t1"));
        assert_eq!(err.to_string(), "no pending metadata for transfer t1");
    }

    #[test]
    fn test_session_error_from_transport_is_transparent() {
        let err: SessionError = TransportError::Unreachable("bob".into()).into();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(
            err.to_string(),
            TransportError::Unreachable("bob".into()).to_string()
        );
    }
}
