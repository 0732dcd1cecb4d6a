//! # Peerlink
//!
//! Direct peer-to-peer chat and file transfer.
//!
//! Two peers open a single connection and exchange chat text and files
//! over it. Nothing is relayed or stored: a file is announced, its bytes
//! follow, and the receiver pairs them up.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerlink::prelude::*;
//!
//! # async fn example() -> Result<(), PeerlinkError> {
//! let node = PeerlinkNode::builder().bind("0.0.0.0:9000").build().await?;
//! println!("share this id: {}", node.id());
//!
//! let mut events = node.session().subscribe();
//! tokio::spawn(node.run());
//!
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::Message(msg) = event {
//!         println!("{}", msg.summary());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod node;

pub use error::PeerlinkError;
pub use node::{PeerlinkNode, PeerlinkNodeBuilder};

/// Re-exports for the common case.
pub mod prelude {
    pub use crate::{PeerlinkError, PeerlinkNode, PeerlinkNodeBuilder};
    pub use peerlink_protocol::{FileMetadata, PeerId, TransferId};
    pub use peerlink_session::{
        ChatLog, ChatMessage, ConnectionState, ConnectionStatus, Download, FileSource,
        MessageBody, MessageKind, Origin, SessionConfig, SessionError, SessionEvent,
        SessionHandle,
    };
    pub use peerlink_transport::{PeerDirectory, TransportError, WebSocketConnection};
}
