//! Ordered key/value persistence with snapshot isolation.
//!
//! The ledger and the native contracts depend only on the abstract
//! [`Store`] traits; the concrete backend (in-memory B-tree or RocksDB) is
//! chosen by node configuration. Mutations accumulate in a [`DataCache`]
//! and become durable in a single atomic batch at commit.

mod cache;
mod error;
mod memory_store;
mod rocksdb_store;
mod storage_key;
mod store;

pub use cache::DataCache;
pub use error::{StorageError, StorageResult};
pub use memory_store::MemoryStore;
pub use rocksdb_store::RocksDbStore;
pub use storage_key::{DataPrefix, StorageItem, StorageKey};
pub use store::{SeekDirection, Store, StoreRead, WriteBatch};
