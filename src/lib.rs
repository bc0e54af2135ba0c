//! The neo3 node core.
//!
//! This crate composes the member crates into a running system: storage,
//! ledger, mempool and consensus wired through [`NeoSystem`], with event
//! buses and an explicit shutdown order instead of process globals.

mod shutdown;
mod system;

pub use shutdown::ShutdownToken;
pub use system::{NeoSystem, RelayResult};

pub use neo3_config as config;
pub use neo3_consensus as consensus;
pub use neo3_core as core;
pub use neo3_cryptography as cryptography;
pub use neo3_io as io;
pub use neo3_ledger as ledger;
pub use neo3_persistence as persistence;
pub use neo3_smart_contract as smart_contract;
pub use neo3_vm as vm;
