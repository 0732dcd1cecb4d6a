//! Local files offered for transfer.

use std::io;
use std::path::{Path, PathBuf};

use peerlink_protocol::{FileMetadata, TransferId};

/// Where a [`FileSource`]'s bytes come from.
#[derive(Debug, Clone)]
enum Contents {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A file the local user wants to send.
///
/// Opening a source only reads filesystem metadata. The contents are read
/// later by [`read`](Self::read), off the session task, so a large file
/// never stalls message routing.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    mime_type: String,
    size: u64,
    contents: Contents,
}

impl FileSource {
    /// Describes the regular file at `path`.
    ///
    /// The name is the path's final component and the MIME type is guessed
    /// from its extension, falling back to `application/octet-stream`.
    ///
    /// # Errors
    /// Any I/O error from `stat`, or `InvalidInput` if `path` is not a
    /// regular file or has no file name.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
            })?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            name,
            mime_type,
            size: meta.len(),
            contents: Contents::Path(path.to_path_buf()),
        })
    }

    /// Wraps bytes already in memory.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            contents: Contents::Bytes(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes as seen when the source was created.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The announcement sent ahead of the payload.
    pub(crate) fn metadata(&self, id: TransferId) -> FileMetadata {
        FileMetadata {
            id,
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
        }
    }

    /// Reads the full contents.
    pub async fn read(self) -> io::Result<Vec<u8>> {
        match self.contents {
            Contents::Path(path) => tokio::fs::read(path).await,
            Contents::Bytes(bytes) => Ok(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_reads_name_size_and_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let source = FileSource::open(&path).await.unwrap();

        assert_eq!(source.name(), "notes.txt");
        assert_eq!(source.size(), 5);
        assert_eq!(source.mime_type(), "text/plain");
        assert_eq!(source.read().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_open_unknown_extension_is_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.zzzunknown");
        tokio::fs::write(&path, [0u8; 4]).await.unwrap();

        let source = FileSource::open(&path).await.unwrap();

        assert_eq!(source.mime_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_open_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let err = FileSource::open(dir.path()).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_open_missing_file_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();

        let err = FileSource::open(dir.path().join("nope.bin")).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_metadata_carries_transfer_id() {
        let source = FileSource::from_bytes("x.txt", "text/plain", vec![1, 2, 3]);

        let meta = source.metadata(TransferId::new("t1"));

        assert_eq!(meta.id, TransferId::new("t1"));
        assert_eq!(meta.name, "x.txt");
        assert_eq!(meta.size, 3);
        assert_eq!(meta.mime_type, "text/plain");
    }
}
