//! Ledger state: the mempool and the block-persistence driver.

mod blockchain;
mod error;
mod events;
mod header_cache;
mod mempool;
mod verify_result;

pub use blockchain::{genesis_block, Blockchain};
pub use error::{LedgerError, LedgerResult};
pub use events::{LedgerEvent, LedgerEventBus, RemovalReason};
pub use header_cache::HeaderCache;
pub use mempool::{MemoryPool, MempoolConfig, PoolEntry};
pub use verify_result::VerifyResult;
