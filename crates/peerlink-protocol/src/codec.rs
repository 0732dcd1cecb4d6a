//! Codec trait and implementations for serializing structured messages.
//!
//! A codec only handles the structured half of the wire: file metadata and
//! file data. Chat text never passes through a codec; it travels as a raw
//! text frame (see [`EnvelopeCodec`](crate::EnvelopeCodec)).
//!
//! [`MsgPackCodec`] is the default because it carries file bytes as a
//! single binary blob. [`JsonCodec`] is handy when reading traffic by eye,
//! at the cost of spelling every byte out as a number.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside the session actor
/// task for as long as the session runs.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// MsgPackCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses MessagePack (via `rmp-serde`).
///
/// Structs are written as maps with field names, so the wire shape is the
/// same `{ id, type, ... }` object a JSON peer would see.
///
/// ```rust
/// use peerlink_protocol::{Codec, FileMetadata, MsgPackCodec, TransferId};
///
/// let codec = MsgPackCodec;
/// let metadata = FileMetadata {
///     id: TransferId::new("t1"),
///     name: "x.txt".into(),
///     size: 3,
///     mime_type: "text/plain".into(),
/// };
///
/// let bytes = codec.encode(&metadata).unwrap();
/// let decoded: FileMetadata = codec.decode(&bytes).unwrap();
/// assert_eq!(metadata, decoded);
/// ```
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

#[cfg(feature = "msgpack")]
impl Codec for MsgPackCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        rmp_serde::to_vec_named(value).map_err(|e| ProtocolError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        rmp_serde::from_slice(data).map_err(|e| ProtocolError::Decode(Box::new(e)))
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Behind the `json` feature. Both peers must use the same codec.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::Decode(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileMetadata, TransferId};

    fn metadata() -> FileMetadata {
        FileMetadata {
            id: TransferId::new("t1"),
            name: "report.pdf".into(),
            size: 2048,
            mime_type: "application/pdf".into(),
        }
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn test_msgpack_decode_truncated_input_returns_decode_error() {
        let codec = MsgPackCodec;
        let bytes = codec.encode(&metadata()).unwrap();

        let result: Result<FileMetadata, _> = codec.decode(&bytes[..bytes.len() / 2]);

        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn test_msgpack_writes_field_names() {
        // Named encoding keeps the wire shape self-describing.
        let bytes = MsgPackCodec.encode(&metadata()).unwrap();

        let has = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
        assert!(has(b"name"));
        assert!(has(b"type"));
        assert!(has(b"report.pdf"));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_decode_garbage_returns_decode_error() {
        let result: Result<FileMetadata, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_encode_produces_wire_field_names() {
        let bytes = JsonCodec.encode(&metadata()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["id"], "t1");
        assert_eq!(json["type"], "application/pdf");
    }
}
