//! RocksDB store backend.

use crate::store::{SeekDirection, Store, StoreRead, WriteBatch};
use crate::{StorageError, StorageResult};
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::Arc;

/// Log-structured on-disk store.
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Opens (or creates) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let db = DB::open(&options, path.as_ref()).map_err(|e| StorageError::Open {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    fn scan(db: &DB, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        let iter = db.iterator(IteratorMode::From(prefix, Direction::Forward));
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = iter
            .map_while(|entry| entry.ok())
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.to_vec(), value.to_vec()))
            .collect();
        if direction == SeekDirection::Backward {
            entries.reverse();
        }
        entries
    }
}

impl StoreRead for RocksDbStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key).ok().flatten()
    }

    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        Self::scan(&self.db, prefix, direction)
    }
}

impl Store for RocksDbStore {
    /// The view holds the database handle; single-writer discipline in the
    /// blockchain actor gives it snapshot semantics (nothing writes while
    /// a block-apply view is live).
    fn snapshot(&self) -> Box<dyn StoreRead> {
        Box::new(RocksDbView {
            db: Arc::clone(&self.db),
        })
    }

    fn write_batch(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut write_batch = rocksdb::WriteBatch::default();
        for key in &batch.deletes {
            write_batch.delete(key);
        }
        for (key, value) in &batch.puts {
            write_batch.put(key, value);
        }
        self.db
            .write(write_batch)
            .map_err(|e| StorageError::backend(e.to_string()))
    }
}

struct RocksDbView {
    db: Arc<DB>,
}

impl StoreRead for RocksDbView {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key).ok().flatten()
    }

    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        RocksDbStore::scan(&self.db, prefix, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        store
            .write_batch(&WriteBatch {
                puts: vec![(b"key".to_vec(), b"value".to_vec())],
                deletes: vec![],
            })
            .unwrap();
        assert_eq!(store.get(b"key"), Some(b"value".to_vec()));
    }

    #[test]
    fn seek_respects_prefix_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        store
            .write_batch(&WriteBatch {
                puts: vec![
                    (vec![1, 2], b"a".to_vec()),
                    (vec![1, 3], b"b".to_vec()),
                    (vec![2, 0], b"c".to_vec()),
                ],
                deletes: vec![],
            })
            .unwrap();
        let entries = store.seek(&[1], SeekDirection::Forward);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, vec![1, 2]);

        let entries = store.seek(&[1], SeekDirection::Backward);
        assert_eq!(entries[0].0, vec![1, 3]);
    }

    #[test]
    fn batch_is_atomic_over_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            store
                .write_batch(&WriteBatch {
                    puts: vec![(b"persisted".to_vec(), b"yes".to_vec())],
                    deletes: vec![],
                })
                .unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"persisted"), Some(b"yes".to_vec()));
    }
}
