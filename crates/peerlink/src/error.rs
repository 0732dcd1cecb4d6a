//! Unified error type for Peerlink.

use peerlink_protocol::ProtocolError;
use peerlink_session::SessionError;
use peerlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PeerlinkError {
    /// A transport-level error (bind, dial, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed envelope).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (not connected, file too large, ...).
    #[error(transparent)]
    Session(#[from] SessionError),
}
