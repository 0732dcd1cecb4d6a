//! Error types for the protocol layer.
//!
//! Each crate in Peerlink defines its own error enum, so a
//! `ProtocolError` always means a problem turning envelopes into bytes or
//! back, never a networking or session problem.

/// A boxed codec error, so one variant can carry any codec's failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] BoxError),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: truncated input, missing fields, wrong types.
    #[error("decode failed: {0}")]
    Decode(#[source] BoxError),

    /// An incoming frame could not be classified as any envelope variant.
    ///
    /// The session layer logs and drops these; the connection stays up.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}
