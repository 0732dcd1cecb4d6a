//! Session layer for Peerlink.
//!
//! This crate owns everything that happens once two peers can exchange
//! frames:
//!
//! 1. **Connection lifecycle**: one connection at a time, driven through
//!    `Idle → Connecting → Open → Closed` by a [`SessionManager`] actor
//! 2. **File transfers**: pairing each announced file with its payload
//!    ([`TransferTable`])
//! 3. **Chat**: the [`ChatMessage`]s a UI appends to its [`ChatLog`], and
//!    saving received files ([`Download`])
//!
//! # How it fits in the stack
//!
//! ```text
//! UI / node (above)  ← SessionHandle: connect, send_message, send_file, events
//!     ↕
//! Session Layer (this crate)  ← connection state, transfers, chat messages
//!     ↕
//! Protocol + Transport (below)  ← envelopes, frames, connections
//! ```

mod error;
mod file;
mod manager;
mod message;
mod session;
mod transfer;

pub use error::{SessionError, TransferError};
pub use file::FileSource;
pub use manager::{SessionHandle, SessionManager};
pub use message::{ChatLog, ChatMessage, Download, FileAttachment, MessageBody, MessageKind, Origin};
pub use session::{ConnectionState, ConnectionStatus, SessionConfig, SessionEvent};
pub use transfer::{CompletedFile, TransferTable};
