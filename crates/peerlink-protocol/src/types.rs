//! Core protocol types for Peerlink's wire format.
//!
//! Identifiers ([`PeerId`], [`TransferId`]), the file description a sender
//! announces ([`FileMetadata`]), and [`Envelope`], the tagged union every
//! incoming frame is classified into.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Characters random identifiers are drawn from (lowercase base 36).
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a freshly generated [`PeerId`]. Short enough to read aloud.
pub const PEER_ID_LEN: usize = 6;

/// Length of a freshly generated [`TransferId`].
pub const TRANSFER_ID_LEN: usize = 11;

/// Generates a random lowercase base-36 token of `len` characters.
pub fn random_token(len: usize) -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// The identifier a peer is reachable under.
///
/// Created once when a node starts and never changes for the lifetime of
/// the process. `#[serde(transparent)]` keeps it a plain string on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random six-character identifier such as `"k3x9qa"`.
    pub fn random() -> Self {
        Self(random_token(PEER_ID_LEN))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Sender-generated token tying a file's metadata to its payload.
///
/// Unique among the sender's in-flight transfers; the receiver uses it as
/// the key of its pending-transfer table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random identifier.
    pub fn random() -> Self {
        Self(random_token(TRANSFER_ID_LEN))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransferId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ---------------------------------------------------------------------------
// FileMetadata
// ---------------------------------------------------------------------------

/// What a sender announces about a file before its bytes follow.
///
/// On the wire: `{ "id": ..., "name": ..., "size": ..., "type": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// The transfer this file belongs to.
    pub id: TransferId,
    /// File name as chosen by the sender. Not a path.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type, e.g. `"text/plain"`.
    #[serde(rename = "type")]
    pub mime_type: String,
}

// ---------------------------------------------------------------------------
// TransferMessage: the structured half of the wire
// ---------------------------------------------------------------------------

/// Structured control messages, internally tagged on `type`:
///
/// ```text
/// { "id": "t1", "type": "metadata", "metadata": { id, name, size, type } }
/// { "id": "t1", "type": "data",     "data": <binary> }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum TransferMessage {
    Metadata {
        id: TransferId,
        metadata: FileMetadata,
    },
    Data {
        id: TransferId,
        #[serde(with = "binary")]
        data: Vec<u8>,
    },
}

/// Serializes a byte vector as a native byte string instead of a sequence
/// of integers. Binary formats store it as one contiguous blob; JSON falls
/// back to an array of numbers, which this also reads.
mod binary {
    use std::fmt;

    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_byte_buf(BytesVisitor)
    }

    struct BytesVisitor;

    impl<'de> de::Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a byte buffer")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
            Ok(v)
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                out.push(byte);
            }
            Ok(out)
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The classified form of one incoming (or outgoing) wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Plain chat text.
    Text { content: String },

    /// A file announcement. `metadata.id` is the transfer id.
    FileMetadata(FileMetadata),

    /// The payload of a previously announced file.
    FileData {
        transfer_id: TransferId,
        bytes: Vec<u8>,
    },
}

impl Envelope {
    /// The transfer this envelope belongs to, if it is file-related.
    pub fn transfer_id(&self) -> Option<&TransferId> {
        match self {
            Envelope::Text { .. } => None,
            Envelope::FileMetadata(metadata) => Some(&metadata.id),
            Envelope::FileData { transfer_id, .. } => Some(transfer_id),
        }
    }

    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Text { .. } => "text",
            Envelope::FileMetadata(_) => "metadata",
            Envelope::FileData { .. } => "data",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire shapes are what a browser peer expects, so these tests pin
    //! the JSON produced by the serde attributes.

    use super::*;

    fn metadata(id: &str) -> FileMetadata {
        FileMetadata {
            id: TransferId::new(id),
            name: "x.txt".into(),
            size: 3,
            mime_type: "text/plain".into(),
        }
    }

    #[test]
    fn test_peer_id_random_is_six_base36_chars() {
        let id = PeerId::random();
        assert_eq!(id.as_str().len(), PEER_ID_LEN);
        assert!(id
            .as_str()
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn test_transfer_id_random_values_differ() {
        // 36^11 possibilities; a collision here means the generator is broken.
        let a = TransferId::random();
        let b = TransferId::random();
        assert_eq!(a.as_str().len(), TRANSFER_ID_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_peer_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PeerId::new("abc123")).unwrap();
        assert_eq!(json, "\"abc123\"");
        assert_eq!(PeerId::new("abc123").to_string(), "abc123");
    }

    #[test]
    fn test_file_metadata_json_format() {
        let json = serde_json::to_value(metadata("t1")).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "id": "t1", "name": "x.txt", "size": 3, "type": "text/plain" })
        );
    }

    #[test]
    fn test_transfer_message_metadata_json_format() {
        let msg = TransferMessage::Metadata {
            id: TransferId::new("t1"),
            metadata: metadata("t1"),
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "metadata");
        assert_eq!(json["id"], "t1");
        assert_eq!(json["metadata"]["name"], "x.txt");
    }

    #[test]
    fn test_transfer_message_data_json_format() {
        let msg = TransferMessage::Data {
            id: TransferId::new("t1"),
            data: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "data");
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_transfer_message_data_reads_json_number_array() {
        let json = r#"{ "id": "t1", "type": "data", "data": [7, 8, 9] }"#;
        let msg: TransferMessage = serde_json::from_str(json).unwrap();

        assert_eq!(
            msg,
            TransferMessage::Data {
                id: TransferId::new("t1"),
                data: vec![7, 8, 9],
            }
        );
    }

    #[test]
    fn test_transfer_message_unknown_type_returns_error() {
        let json = r#"{ "id": "t1", "type": "resume", "offset": 10 }"#;
        let result: Result<TransferMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_transfer_id_and_kind() {
        let text = Envelope::Text {
            content: "hi".into(),
        };
        assert_eq!(text.transfer_id(), None);
        assert_eq!(text.kind(), "text");

        let meta = Envelope::FileMetadata(metadata("t9"));
        assert_eq!(meta.transfer_id(), Some(&TransferId::new("t9")));

        let data = Envelope::FileData {
            transfer_id: TransferId::new("t9"),
            bytes: vec![],
        };
        assert_eq!(data.kind(), "data");
    }
}
