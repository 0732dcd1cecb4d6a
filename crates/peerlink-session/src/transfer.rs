//! The receiver-side file transfer state machine.
//!
//! A file arrives as two messages: a small metadata announcement, then the
//! payload. [`TransferTable`] holds each announcement until its payload
//! shows up and pairs them into a [`CompletedFile`]. The table belongs to a
//! single connection and is wiped when that connection goes away.
//!
//! ```text
//! on_metadata(t1) ──→ [pending: t1] ──on_data(t1)──→ CompletedFile
//!                          │
//!                          └──reset()──→ [] ──on_data(t1)──→ Orphaned
//! ```

use std::collections::HashMap;

use peerlink_protocol::{FileMetadata, TransferId};

use crate::TransferError;

/// A file whose metadata and payload have both arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub metadata: FileMetadata,
    pub bytes: Vec<u8>,
}

/// Pending transfers on one connection, keyed by transfer id.
///
/// Completion fires at most once per id: the entry is removed the moment
/// its payload is paired, so a repeated payload finds nothing.
#[derive(Debug, Default)]
pub struct TransferTable {
    pending: HashMap<TransferId, FileMetadata>,
}

impl TransferTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an announced file.
    ///
    /// A second announcement under the same id replaces the first (last
    /// writer wins). Returns `true` when that happened.
    pub fn on_metadata(&mut self, metadata: FileMetadata) -> bool {
        let id = metadata.id.clone();
        let overwritten = self.pending.insert(id.clone(), metadata).is_some();
        if overwritten {
            tracing::warn!(transfer_id = %id, "metadata re-announced, replacing pending entry");
        } else {
            tracing::debug!(transfer_id = %id, "transfer pending");
        }
        overwritten
    }

    /// Pairs a payload with its pending metadata and removes the entry.
    ///
    /// # Errors
    /// [`TransferError::Orphaned`] when no metadata is pending for `id`.
    /// The payload is dropped.
    pub fn on_data(
        &mut self,
        id: &TransferId,
        bytes: Vec<u8>,
    ) -> Result<CompletedFile, TransferError> {
        let metadata = self
            .pending
            .remove(id)
            .ok_or_else(|| TransferError::Orphaned(id.clone()))?;

        if metadata.size != bytes.len() as u64 {
            tracing::warn!(
                transfer_id = %id,
                announced = metadata.size,
                received = bytes.len(),
                "payload size differs from announced size"
            );
        }

        tracing::debug!(transfer_id = %id, name = %metadata.name, "transfer complete");
        Ok(CompletedFile { metadata, bytes })
    }

    /// Discards every pending transfer. Returns how many were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "pending transfers discarded");
        }
        dropped
    }

    /// Returns `true` if metadata for `id` is waiting for its payload.
    pub fn contains(&self, id: &TransferId) -> bool {
        self.pending.contains_key(id)
    }

    /// Iterates over the announced files still waiting for their payload.
    pub fn pending(&self) -> impl Iterator<Item = &FileMetadata> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(id: &str, name: &str, size: u64) -> FileMetadata {
        FileMetadata {
            id: TransferId::new(id),
            name: name.into(),
            size,
            mime_type: "application/octet-stream".into(),
        }
    }

    // =====================================================================
    // on_metadata / on_data
    // =====================================================================

    #[test]
    fn test_on_data_after_metadata_completes_once() {
        let mut table = TransferTable::new();
        let id = TransferId::new("t1");

        assert!(!table.on_metadata(metadata("t1", "x.txt", 3)));
        let done = table.on_data(&id, vec![1, 2, 3]).unwrap();

        assert_eq!(done.metadata, metadata("t1", "x.txt", 3));
        assert_eq!(done.bytes, vec![1, 2, 3]);
        assert!(table.is_empty());

        // A repeated payload finds nothing: completion fired already.
        let again = table.on_data(&id, vec![1, 2, 3]);
        assert!(matches!(again, Err(TransferError::Orphaned(ref t)) if *t == id));
    }

    #[test]
    fn test_on_metadata_alone_does_not_complete() {
        let mut table = TransferTable::new();
        table.on_metadata(metadata("t1", "x.txt", 3));

        assert!(table.contains(&TransferId::new("t1")));
        assert_eq!(table.len(), 1);
        assert_eq!(table.pending().count(), 1);
    }

    #[test]
    fn test_on_data_without_metadata_is_orphaned() {
        let mut table = TransferTable::new();

        let result = table.on_data(&TransferId::new("ghost"), vec![9]);

        assert!(matches!(result, Err(TransferError::Orphaned(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn test_on_metadata_twice_last_writer_wins() {
        let mut table = TransferTable::new();
        table.on_metadata(metadata("t1", "old.txt", 1));

        assert!(table.on_metadata(metadata("t1", "new.txt", 2)));
        assert_eq!(table.len(), 1);

        let done = table.on_data(&TransferId::new("t1"), vec![4, 5]).unwrap();
        assert_eq!(done.metadata.name, "new.txt");
    }

    #[test]
    fn test_on_data_size_mismatch_still_completes() {
        let mut table = TransferTable::new();
        table.on_metadata(metadata("t1", "x.txt", 10));

        let done = table.on_data(&TransferId::new("t1"), vec![1, 2]).unwrap();

        assert_eq!(done.bytes.len(), 2);
        assert_eq!(done.metadata.size, 10);
    }

    // =====================================================================
    // Interleaving
    // =====================================================================

    #[test]
    fn test_interleaved_transfers_pair_correctly() {
        let mut table = TransferTable::new();
        let a = TransferId::new("a");
        let b = TransferId::new("b");

        table.on_metadata(metadata("a", "a.bin", 1));
        table.on_metadata(metadata("b", "b.bin", 2));
        let done_a = table.on_data(&a, vec![0xaa]).unwrap();
        let done_b = table.on_data(&b, vec![0xbb, 0xbb]).unwrap();

        assert_eq!(done_a.metadata.name, "a.bin");
        assert_eq!(done_a.bytes, vec![0xaa]);
        assert_eq!(done_b.metadata.name, "b.bin");
        assert_eq!(done_b.bytes, vec![0xbb, 0xbb]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_interleaved_data_in_reverse_order_pairs_correctly() {
        let mut table = TransferTable::new();

        table.on_metadata(metadata("a", "a.bin", 1));
        table.on_metadata(metadata("b", "b.bin", 1));
        let done_b = table.on_data(&TransferId::new("b"), vec![2]).unwrap();
        let done_a = table.on_data(&TransferId::new("a"), vec![1]).unwrap();

        assert_eq!((done_a.metadata.name.as_str(), done_a.bytes), ("a.bin", vec![1]));
        assert_eq!((done_b.metadata.name.as_str(), done_b.bytes), ("b.bin", vec![2]));
    }

    #[test]
    fn test_sequential_transfers_each_complete() {
        let mut table = TransferTable::new();

        table.on_metadata(metadata("a", "a.bin", 1));
        assert!(table.on_data(&TransferId::new("a"), vec![1]).is_ok());
        table.on_metadata(metadata("b", "b.bin", 1));
        assert!(table.on_data(&TransferId::new("b"), vec![2]).is_ok());

        assert!(table.is_empty());
    }

    // =====================================================================
    // reset
    // =====================================================================

    #[test]
    fn test_reset_purges_pending_and_orphans_later_data() {
        let mut table = TransferTable::new();
        table.on_metadata(metadata("t1", "x.txt", 3));
        table.on_metadata(metadata("t2", "y.txt", 3));

        assert_eq!(table.reset(), 2);
        assert!(table.is_empty());

        let result = table.on_data(&TransferId::new("t1"), vec![1, 2, 3]);
        assert!(matches!(result, Err(TransferError::Orphaned(_))));
    }

    #[test]
    fn test_reset_empty_table_returns_zero() {
        let mut table = TransferTable::new();
        assert_eq!(table.reset(), 0);
    }
}
