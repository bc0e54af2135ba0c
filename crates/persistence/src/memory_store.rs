//! In-memory store backend.

use crate::store::{SeekDirection, Store, StoreRead, WriteBatch};
use crate::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// A `BTreeMap`-backed store for tests and transient state.
#[derive(Default)]
pub struct MemoryStore {
    map: Arc<RwLock<Map>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

fn scan(map: &Map, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = map
        .range(prefix.to_vec()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if direction == SeekDirection::Backward {
        entries.reverse();
    }
    entries
}

impl StoreRead for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.read().get(key).cloned()
    }

    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        scan(&self.map.read(), prefix, direction)
    }
}

impl Store for MemoryStore {
    fn snapshot(&self) -> Box<dyn StoreRead> {
        Box::new(MemorySnapshot {
            map: self.map.read().clone(),
        })
    }

    fn write_batch(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut map = self.map.write();
        for key in &batch.deletes {
            map.remove(key);
        }
        for (key, value) in &batch.puts {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// A frozen copy of the map taken at snapshot time.
struct MemorySnapshot {
    map: Map,
}

impl StoreRead for MemorySnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        scan(&self.map, prefix, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(store: &MemoryStore, key: &[u8], value: &[u8]) {
        store
            .write_batch(&WriteBatch {
                puts: vec![(key.to_vec(), value.to_vec())],
                deletes: vec![],
            })
            .unwrap();
    }

    #[test]
    fn get_after_put() {
        let store = MemoryStore::new();
        put(&store, b"k", b"v");
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
        assert!(store.contains(b"k"));
        assert!(!store.contains(b"missing"));
    }

    #[test]
    fn seek_is_ordered_and_prefix_bounded() {
        let store = MemoryStore::new();
        for key in [&b"aa"[..], b"ab", b"ac", b"b"] {
            put(&store, key, b"v");
        }
        let forward = store.seek(b"a", SeekDirection::Forward);
        let keys: Vec<&[u8]> = forward.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"aa"[..], b"ab", b"ac"]);

        let backward = store.seek(b"a", SeekDirection::Backward);
        assert_eq!(backward[0].0, b"ac".to_vec());
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let store = MemoryStore::new();
        put(&store, b"k", b"before");
        let snapshot = store.snapshot();
        put(&store, b"k", b"after");
        assert_eq!(snapshot.get(b"k"), Some(b"before".to_vec()));
        assert_eq!(store.get(b"k"), Some(b"after".to_vec()));
    }

    #[test]
    fn batch_applies_deletes_then_puts() {
        let store = MemoryStore::new();
        put(&store, b"k", b"v");
        store
            .write_batch(&WriteBatch {
                puts: vec![(b"k".to_vec(), b"new".to_vec())],
                deletes: vec![b"k".to_vec()],
            })
            .unwrap();
        assert_eq!(store.get(b"k"), Some(b"new".to_vec()));
    }
}
