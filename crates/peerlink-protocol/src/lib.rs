//! Wire protocol for Peerlink.
//!
//! This crate defines what two peers say to each other:
//!
//! - **Types** ([`PeerId`], [`TransferId`], [`FileMetadata`], [`Envelope`])
//! - **Codec** ([`Codec`] trait, [`MsgPackCodec`], `JsonCodec`): how the
//!   structured messages become bytes
//! - **Envelope codec** ([`EnvelopeCodec`]): which native frame form each
//!   envelope travels as, and how incoming frames are classified
//! - **Errors** ([`ProtocolError`])
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Session (chat + transfers)
//! ```

mod codec;
mod envelope;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
#[cfg(feature = "msgpack")]
pub use codec::MsgPackCodec;
pub use envelope::EnvelopeCodec;
pub use error::{BoxError, ProtocolError};
pub use types::{
    Envelope, FileMetadata, PEER_ID_LEN, PeerId, TRANSFER_ID_LEN, TransferId, random_token,
};
