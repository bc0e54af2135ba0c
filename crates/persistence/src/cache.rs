//! Write-through tracked cache over a store view.

use crate::store::{SeekDirection, Store, StoreRead, WriteBatch};
use crate::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A mutable snapshot: reads fall through to the base view, writes stay in
/// the cache until committed.
///
/// `None` marks a deletion. The dirty map is ordered by key, so a commit
/// flushes deterministically.
pub struct DataCache {
    base: Arc<dyn StoreRead>,
    dirty: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl DataCache {
    /// Creates a cache over an isolated base view.
    pub fn new(base: Arc<dyn StoreRead>) -> Self {
        Self {
            base,
            dirty: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a cache over a fresh snapshot of `store`.
    pub fn from_store(store: &dyn Store) -> Self {
        Self::new(Arc::from(store.snapshot()))
    }

    /// Reads through the cache.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(entry) = self.dirty.read().get(key) {
            return entry.clone();
        }
        self.base.get(key)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Stages an insert or update.
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.dirty.write().insert(key.into(), Some(value.into()));
    }

    /// Stages a deletion.
    pub fn delete(&self, key: impl Into<Vec<u8>>) {
        self.dirty.write().insert(key.into(), None);
    }

    /// Merged prefix scan over staged and base entries.
    pub fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        let dirty = self.dirty.read();
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .base
            .seek(prefix, SeekDirection::Forward)
            .into_iter()
            .collect();
        for (key, entry) in dirty.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match entry {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = merged.into_iter().collect();
        if direction == SeekDirection::Backward {
            entries.reverse();
        }
        entries
    }

    /// Whether any mutation is staged.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.read().is_empty()
    }

    /// A nested cache observing this cache's current merged state. Changes
    /// in the child stay invisible here until [`commit_into`] is called.
    ///
    /// [`commit_into`]: DataCache::commit_into
    pub fn nested(&self) -> DataCache {
        DataCache::new(Arc::new(self.freeze()))
    }

    /// Applies this cache's staged changes into `parent`.
    pub fn commit_into(&self, parent: &DataCache) {
        let dirty = self.dirty.read();
        for (key, entry) in dirty.iter() {
            match entry {
                Some(value) => parent.put(key.clone(), value.clone()),
                None => parent.delete(key.clone()),
            }
        }
    }

    /// The staged changes as an atomic batch, ordered by key.
    pub fn to_write_batch(&self) -> WriteBatch {
        let dirty = self.dirty.read();
        let mut batch = WriteBatch::default();
        for (key, entry) in dirty.iter() {
            match entry {
                Some(value) => batch.puts.push((key.clone(), value.clone())),
                None => batch.deletes.push(key.clone()),
            }
        }
        batch
    }

    /// Flushes the staged changes into `store` atomically. On failure the
    /// store is untouched and the cache can be discarded.
    pub fn commit(&self, store: &dyn Store) -> StorageResult<()> {
        store.write_batch(&self.to_write_batch())
    }

    /// Discards every staged change.
    pub fn rollback(&self) {
        self.dirty.write().clear();
    }

    /// An immutable deep copy of the merged state for nesting.
    fn freeze(&self) -> FrozenCache {
        FrozenCache {
            base: Arc::clone(&self.base),
            dirty: self.dirty.read().clone(),
        }
    }
}

impl StoreRead for DataCache {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        DataCache::get(self, key)
    }

    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        DataCache::seek(self, prefix, direction)
    }
}

/// A point-in-time copy of a cache's overlay, safe to share as a base.
struct FrozenCache {
    base: Arc<dyn StoreRead>,
    dirty: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl StoreRead for FrozenCache {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(entry) = self.dirty.get(key) {
            return entry.clone();
        }
        self.base.get(key)
    }

    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .base
            .seek(prefix, SeekDirection::Forward)
            .into_iter()
            .collect();
        for (key, entry) in self.dirty.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match entry {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = merged.into_iter().collect();
        if direction == SeekDirection::Backward {
            entries.reverse();
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn store_with(entries: &[(&[u8], &[u8])]) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .write_batch(&WriteBatch {
                puts: entries
                    .iter()
                    .map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .collect(),
                deletes: vec![],
            })
            .unwrap();
        store
    }

    #[test]
    fn reads_fall_through_until_written() {
        let store = store_with(&[(b"k", b"base")]);
        let cache = DataCache::from_store(&store);
        assert_eq!(cache.get(b"k"), Some(b"base".to_vec()));
        cache.put(b"k".to_vec(), b"staged".to_vec());
        assert_eq!(cache.get(b"k"), Some(b"staged".to_vec()));
        // The store is untouched until commit.
        assert_eq!(store.get(b"k"), Some(b"base".to_vec()));
    }

    #[test]
    fn delete_masks_base_entries() {
        let store = store_with(&[(b"k", b"v")]);
        let cache = DataCache::from_store(&store);
        cache.delete(b"k".to_vec());
        assert_eq!(cache.get(b"k"), None);
        assert!(cache
            .seek(b"k", SeekDirection::Forward)
            .is_empty());
    }

    #[test]
    fn commit_flushes_only_dirty_entries() {
        let store = store_with(&[(b"a", b"1"), (b"b", b"2")]);
        let cache = DataCache::from_store(&store);
        cache.put(b"c".to_vec(), b"3".to_vec());
        cache.delete(b"a".to_vec());
        let batch = cache.to_write_batch();
        assert_eq!(batch.len(), 2);
        cache.commit(&store).unwrap();
        assert_eq!(store.get(b"a"), None);
        assert_eq!(store.get(b"c"), Some(b"3".to_vec()));
        assert_eq!(store.get(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn dropping_without_commit_changes_nothing() {
        let store = store_with(&[(b"k", b"v")]);
        {
            let cache = DataCache::from_store(&store);
            cache.put(b"k".to_vec(), b"changed".to_vec());
            cache.put(b"new".to_vec(), b"x".to_vec());
        }
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
        assert_eq!(store.get(b"new"), None);
    }

    #[test]
    fn nested_commit_into_parent() {
        let store = store_with(&[(b"k", b"v")]);
        let parent = DataCache::from_store(&store);
        let child = parent.nested();
        child.put(b"k".to_vec(), b"child".to_vec());
        // Invisible to the parent until committed.
        assert_eq!(parent.get(b"k"), Some(b"v".to_vec()));
        child.commit_into(&parent);
        assert_eq!(parent.get(b"k"), Some(b"child".to_vec()));
    }

    #[test]
    fn nested_discard_leaves_parent_identical() {
        let store = store_with(&[(b"k", b"v")]);
        let parent = DataCache::from_store(&store);
        parent.put(b"staged".to_vec(), b"1".to_vec());
        let before = parent.to_write_batch();
        {
            let child = parent.nested();
            child.put(b"k".to_vec(), b"discarded".to_vec());
            child.delete(b"staged".to_vec());
        }
        assert_eq!(parent.to_write_batch(), before);
    }

    #[test]
    fn seek_merges_overlay_and_base() {
        let store = store_with(&[(b"p1", b"base1"), (b"p2", b"base2")]);
        let cache = DataCache::from_store(&store);
        cache.put(b"p2".to_vec(), b"staged".to_vec());
        cache.put(b"p3".to_vec(), b"new".to_vec());
        cache.delete(b"p1".to_vec());
        let entries = cache.seek(b"p", SeekDirection::Forward);
        let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"p2"[..], b"p3"]);
        assert_eq!(entries[0].1, b"staged".to_vec());
    }
}
