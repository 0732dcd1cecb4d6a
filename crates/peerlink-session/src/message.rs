//! Chat messages, the chat log, and saving received files.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use peerlink_protocol::{FileMetadata, TRANSFER_ID_LEN, random_token};

/// Which side of the connection produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    File,
}

/// A file shown in the chat.
///
/// `bytes` is `None` on the sender's own copy, which is logged as soon as
/// the transfer starts and before the file has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub metadata: FileMetadata,
    pub bytes: Option<Arc<[u8]>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    File(FileAttachment),
}

/// One displayed item. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Random for text. For files, the transfer id.
    pub id: String,
    pub origin: Origin,
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
}

impl ChatMessage {
    /// A text message stamped with the current time.
    pub fn text(origin: Origin, content: impl Into<String>) -> Self {
        Self {
            id: random_token(TRANSFER_ID_LEN),
            origin,
            timestamp: Utc::now(),
            body: MessageBody::Text(content.into()),
        }
    }

    /// A file message stamped with the current time.
    pub fn file(origin: Origin, metadata: FileMetadata, bytes: Option<Arc<[u8]>>) -> Self {
        Self {
            id: metadata.id.to_string(),
            origin,
            timestamp: Utc::now(),
            body: MessageBody::File(FileAttachment { metadata, bytes }),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::File(_) => MessageKind::File,
        }
    }

    /// One-line rendering: the text itself, or `File: <name>`.
    pub fn summary(&self) -> String {
        match &self.body {
            MessageBody::Text(content) => content.clone(),
            MessageBody::File(file) => format!("File: {}", file.metadata.name),
        }
    }

    /// Reconstructs a received file so it can be saved.
    ///
    /// Returns `None` for text messages and for files whose bytes are not
    /// held in memory.
    pub fn download(&self) -> Option<Download> {
        let MessageBody::File(file) = &self.body else {
            return None;
        };
        let bytes = file.bytes.clone()?;
        Some(Download {
            file_name: file.metadata.name.clone(),
            mime_type: file.metadata.mime_type.clone(),
            bytes,
        })
    }
}

/// A completed file ready to be written out.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
}

impl Download {
    /// Writes the file into `dir` and returns the path written.
    ///
    /// The name comes from the remote peer, so only its final component is
    /// used. A name with none (such as `".."`) is saved as `download`.
    pub async fn save_in(&self, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
        let name = Path::new(&self.file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "download".into());
        let path = dir.as_ref().join(name);
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!(path = %path.display(), size = self.bytes.len(), "file saved");
        Ok(path)
    }
}

/// Append-only, ordered record of a session's messages.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Looks up a message by id. The most recent one wins if ids repeat.
    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
