//! Protocol configuration for the neo3 node.
//!
//! This crate holds the protocol-level constants shared by every layer and
//! the [`ProtocolSettings`] type loaded at node startup. Constants here are
//! compile-time values; everything tunable at runtime lives on
//! `ProtocolSettings` or in the Policy native contract.

mod settings;

pub use settings::ProtocolSettings;

use serde::{Deserialize, Serialize};

/// Blockchain timing constants.
pub const SECONDS_PER_BLOCK: u64 = 15;
/// Time between two blocks in milliseconds.
pub const MILLISECONDS_PER_BLOCK: u64 = SECONDS_PER_BLOCK * 1000;

/// Maximum serialized size of a block in bytes.
pub const MAX_BLOCK_SIZE: usize = 2_097_152;
/// Maximum serialized size of a transaction in bytes (2 MiB).
pub const MAX_TRANSACTION_SIZE: usize = 2_097_152;
/// Maximum number of transactions in a block.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 512;
/// Maximum number of attributes on a transaction.
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;
/// Maximum number of blocks a transaction stays traceable.
pub const MAX_TRACEABLE_BLOCKS: u32 = 2_102_400;
/// Maximum increment of `valid_until_block` over the current height.
pub const MAX_VALID_UNTIL_BLOCK_INCREMENT: u32 = 5760;

/// Size of a `UInt256` hash in bytes.
pub const HASH_SIZE: usize = 32;
/// Size of a `UInt160` script hash in bytes.
pub const ADDRESS_SIZE: usize = 20;
/// Version byte prefixed to script hashes in Base58Check addresses.
pub const ADDRESS_VERSION: u8 = 0x35;

/// Maximum length of an executable script in bytes.
pub const MAX_SCRIPT_LENGTH: usize = 65536;

// VM execution limits.
/// Maximum number of items on the evaluation stack plus tracked compounds.
pub const MAX_STACK_SIZE: usize = 2048;
/// Maximum depth of the invocation stack.
pub const MAX_INVOCATION_STACK_SIZE: usize = 1024;
/// Maximum serialized size of a single stack item (1 MiB).
pub const MAX_ITEM_SIZE: usize = 1_048_576;
/// Maximum shift distance for SHL / SHR.
pub const MAX_SHIFT: u32 = 256;
/// Maximum nesting depth of try frames.
pub const MAX_TRY_NESTING_DEPTH: usize = 16;

// Storage limits.
/// Maximum contract storage key length in bytes.
pub const MAX_STORAGE_KEY_SIZE: usize = 64;
/// Maximum contract storage value length in bytes.
pub const MAX_STORAGE_VALUE_SIZE: usize = 65535;

// Fee constants (GAS fractions; GAS has eight decimals).
/// Default network fee charged per transaction byte.
pub const DEFAULT_FEE_PER_BYTE: i64 = 1000;
/// Default execution fee factor applied to opcode base prices.
pub const DEFAULT_EXEC_FEE_FACTOR: u32 = 30;
/// Default price per byte of contract storage.
pub const DEFAULT_STORAGE_PRICE: u32 = 100_000;
/// Gas ceiling for a witness verification execution (0.3 GAS).
pub const MAX_VERIFICATION_GAS: i64 = 1_50000000 / 5;

// Consensus constants.
/// Maximum number of consensus validators supported.
pub const MAX_VALIDATORS: usize = 21;
/// Minimum number of consensus validators required.
pub const MIN_VALIDATORS: usize = 4;

/// The network flavor a node runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NetworkType {
    MainNet,
    TestNet,
    #[default]
    Private,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_consistent() {
        assert!(MAX_TRANSACTION_SIZE <= MAX_BLOCK_SIZE);
        assert!(MAX_SCRIPT_LENGTH < MAX_ITEM_SIZE);
        assert!(MIN_VALIDATORS <= MAX_VALIDATORS);
    }
}
