//! Classifies frames into envelopes and back.
//!
//! The transport carries two native forms. Chat text goes out as a raw
//! text frame with no wrapping. File metadata and file data go out as a
//! binary frame holding a codec-encoded, `type`-tagged message. Decoding
//! reverses that: a text frame is always `Text`, a binary frame is parsed
//! and classified by its discriminant.

use peerlink_transport::Frame;

use crate::types::TransferMessage;
use crate::{Codec, Envelope, FileMetadata, ProtocolError, TransferId};

/// Turns envelopes into [`Frame`]s and frames into [`Envelope`]s.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec<C> {
    codec: C,
}

impl<C: Codec> EnvelopeCodec<C> {
    /// Wraps the codec used for structured messages.
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Encodes chat text. Never fails: text is sent as-is.
    pub fn encode_text(&self, content: &str) -> Frame {
        Frame::Text(content.to_owned())
    }

    /// Encodes a file announcement.
    pub fn encode_metadata(&self, metadata: &FileMetadata) -> Result<Frame, ProtocolError> {
        let msg = TransferMessage::Metadata {
            id: metadata.id.clone(),
            metadata: metadata.clone(),
        };
        self.codec.encode(&msg).map(Frame::Binary)
    }

    /// Encodes a file payload. The bytes are written as one binary value.
    pub fn encode_data(
        &self,
        transfer_id: &TransferId,
        bytes: Vec<u8>,
    ) -> Result<Frame, ProtocolError> {
        let msg = TransferMessage::Data {
            id: transfer_id.clone(),
            data: bytes,
        };
        self.codec.encode(&msg).map(Frame::Binary)
    }

    /// Encodes any envelope.
    pub fn encode(&self, envelope: Envelope) -> Result<Frame, ProtocolError> {
        match envelope {
            Envelope::Text { content } => Ok(Frame::Text(content)),
            Envelope::FileMetadata(metadata) => self.encode_metadata(&metadata),
            Envelope::FileData { transfer_id, bytes } => self.encode_data(&transfer_id, bytes),
        }
    }

    /// Classifies an incoming frame.
    ///
    /// # Errors
    /// [`ProtocolError::MalformedEnvelope`] when a binary frame does not
    /// parse, has an unknown `type`, or announces metadata whose `id`
    /// disagrees with the transfer id it is filed under.
    pub fn decode(&self, frame: Frame) -> Result<Envelope, ProtocolError> {
        let data = match frame {
            Frame::Text(content) => return Ok(Envelope::Text { content }),
            Frame::Binary(data) => data,
        };

        let msg: TransferMessage = self
            .codec
            .decode(&data)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

        match msg {
            TransferMessage::Metadata { id, metadata } => {
                if metadata.id != id {
                    return Err(ProtocolError::MalformedEnvelope(format!(
                        "metadata for {} filed under transfer {id}",
                        metadata.id
                    )));
                }
                Ok(Envelope::FileMetadata(metadata))
            }
            TransferMessage::Data { id, data } => Ok(Envelope::FileData {
                transfer_id: id,
                bytes: data,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(id: &str) -> FileMetadata {
        FileMetadata {
            id: TransferId::new(id),
            name: "x.txt".into(),
            size: 3,
            mime_type: "text/plain".into(),
        }
    }

    #[cfg(feature = "msgpack")]
    mod msgpack {
        use super::*;
        use crate::MsgPackCodec;

        fn codec() -> EnvelopeCodec<MsgPackCodec> {
            EnvelopeCodec::new(MsgPackCodec)
        }

        #[test]
        fn test_encode_text_is_raw_text_frame() {
            assert_eq!(codec().encode_text("hi"), Frame::Text("hi".into()));
        }

        #[test]
        fn test_decode_text_round_trip() {
            let codec = codec();
            let envelope = codec.decode(codec.encode_text("hi")).unwrap();
            assert_eq!(
                envelope,
                Envelope::Text {
                    content: "hi".into()
                }
            );
        }

        #[test]
        fn test_decode_metadata_round_trip() {
            let codec = codec();
            let frame = codec.encode_metadata(&metadata("t1")).unwrap();

            assert!(matches!(frame, Frame::Binary(_)));
            assert_eq!(
                codec.decode(frame).unwrap(),
                Envelope::FileMetadata(metadata("t1"))
            );
        }

        #[test]
        fn test_decode_data_round_trip() {
            let codec = codec();
            let id = TransferId::new("t1");
            let frame = codec.encode_data(&id, vec![1, 2, 3]).unwrap();

            assert_eq!(
                codec.decode(frame).unwrap(),
                Envelope::FileData {
                    transfer_id: id,
                    bytes: vec![1, 2, 3],
                }
            );
        }

        #[test]
        fn test_encode_data_keeps_payload_contiguous() {
            // The payload must be one binary blob, not re-encoded.
            let payload = [0xde, 0xad, 0xbe, 0xef, 0x00, 0x42];
            let frame = codec()
                .encode_data(&TransferId::new("t1"), payload.to_vec())
                .unwrap();

            let Frame::Binary(bytes) = frame else {
                panic!("data must travel as a binary frame");
            };
            assert!(bytes.windows(payload.len()).any(|w| w == payload));
        }

        #[test]
        fn test_decode_garbage_is_malformed() {
            let result = codec().decode(Frame::Binary(b"\xc1\xc1\xc1".to_vec()));
            assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
        }

        #[test]
        fn test_decode_unknown_discriminant_is_malformed() {
            #[derive(serde::Serialize)]
            struct Resume {
                id: &'static str,
                #[serde(rename = "type")]
                kind: &'static str,
            }
            let bytes = MsgPackCodec
                .encode(&Resume {
                    id: "t1",
                    kind: "resume",
                })
                .unwrap();

            let result = codec().decode(Frame::Binary(bytes));

            assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
        }

        #[test]
        fn test_decode_metadata_with_mismatched_id_is_malformed() {
            let msg = TransferMessage::Metadata {
                id: TransferId::new("outer"),
                metadata: metadata("inner"),
            };
            let bytes = MsgPackCodec.encode(&msg).unwrap();

            let result = codec().decode(Frame::Binary(bytes));

            assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
        }

        #[test]
        fn test_encode_envelope_dispatches_by_variant() {
            let codec = codec();
            let envelope = Envelope::FileData {
                transfer_id: TransferId::new("t2"),
                bytes: vec![9],
            };

            let frame = codec.encode(envelope.clone()).unwrap();

            assert_eq!(codec.decode(frame).unwrap(), envelope);
        }
    }

    #[cfg(feature = "json")]
    mod json {
        use super::*;
        use crate::JsonCodec;

        #[test]
        fn test_json_data_round_trip() {
            let codec = EnvelopeCodec::new(JsonCodec);
            let id = TransferId::new("t1");
            let frame = codec.encode_data(&id, vec![1, 2, 3]).unwrap();

            assert_eq!(
                codec.decode(frame).unwrap(),
                Envelope::FileData {
                    transfer_id: id,
                    bytes: vec![1, 2, 3],
                }
            );
        }

        #[test]
        fn test_json_metadata_matches_wire_shape() {
            let codec = EnvelopeCodec::new(JsonCodec);
            let Frame::Binary(bytes) = codec.encode_metadata(&metadata("t1")).unwrap() else {
                panic!("metadata must travel as a binary frame");
            };
            let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

            assert_eq!(json["id"], "t1");
            assert_eq!(json["type"], "metadata");
            assert_eq!(json["metadata"]["size"], 3);
        }
    }
}
