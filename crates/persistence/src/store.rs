//! Abstract store traits.

use crate::StorageResult;

/// Direction of a prefix scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Read interface shared by live stores, snapshots and caches.
///
/// Iteration order is total and deterministic: lexicographic over the raw
/// key bytes, reversed for backward scans.
pub trait StoreRead: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Whether `key` is present.
    fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// All entries whose key starts with `prefix`, in key order.
    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// A batch of mutations applied atomically.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    /// Inserts and updates, ordered by key at build time.
    pub puts: Vec<(Vec<u8>, Vec<u8>)>,
    /// Deletions, ordered by key at build time.
    pub deletes: Vec<Vec<u8>>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.puts.len() + self.deletes.len()
    }
}

/// A durable ordered key/value store.
pub trait Store: StoreRead {
    /// An isolated read view of the store as of this call. Writes applied
    /// after the call do not show through the view.
    fn snapshot(&self) -> Box<dyn StoreRead>;

    /// Applies `batch` atomically. On error nothing is applied.
    fn write_batch(&self, batch: &WriteBatch) -> StorageResult<()>;
}
