//! Protocol settings loaded at node startup.

use crate::{
    NetworkType, MAX_TRACEABLE_BLOCKS, MAX_TRANSACTIONS_PER_BLOCK,
    MAX_VALID_UNTIL_BLOCK_INCREMENT, MILLISECONDS_PER_BLOCK,
};
use serde::{Deserialize, Serialize};

/// Immutable protocol parameters agreed on by every node of a network.
///
/// Loaded once from configuration and threaded by handle through the system;
/// nothing here changes after startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// The magic number identifying the network.
    pub network: u32,
    /// The address version byte used in Base58Check addresses.
    pub address_version: u8,
    /// Compressed secp256r1 public keys of the standby committee, hex-encoded.
    pub standby_committee: Vec<String>,
    /// How many committee members act as consensus validators.
    pub validators_count: usize,
    /// Milliseconds between two blocks.
    pub milliseconds_per_block: u64,
    /// Maximum increment of `valid_until_block` over the current height.
    pub max_valid_until_block_increment: u32,
    /// Maximum number of transactions per block.
    pub max_transactions_per_block: usize,
    /// Maximum number of transactions held in the memory pool.
    pub memory_pool_max_transactions: usize,
    /// Number of blocks a transaction hash stays traceable.
    pub max_traceable_blocks: u32,
    /// Total GAS distributed at genesis, in GAS fractions.
    pub initial_gas_distribution: i64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self::default_private()
    }
}

impl ProtocolSettings {
    /// Settings for a single-machine private network with four standby
    /// validators, usable in tests without any configuration file.
    pub fn default_private() -> Self {
        Self {
            network: 0x334F454E,
            address_version: crate::ADDRESS_VERSION,
            standby_committee: vec![
                "02486fd15702c4490a26703112a5cc1d0923fd697a33406bd5a1c00e0013b09a70".into(),
                "024c7b7fb6c310fccf1ba33b082519d82964ea93868d676662d4a59ad548df0e7d".into(),
                "02aaec38470f6aad0042c6e877cfd8087d2676b0f516fddd362801b9bd3936399e".into(),
                "03b209fd4f53a7170ea4444e0cb0a6bb6a53c2bd016926989cf85f9b0fba17a70c".into(),
            ],
            validators_count: 4,
            milliseconds_per_block: MILLISECONDS_PER_BLOCK,
            max_valid_until_block_increment: MAX_VALID_UNTIL_BLOCK_INCREMENT,
            max_transactions_per_block: MAX_TRANSACTIONS_PER_BLOCK,
            memory_pool_max_transactions: 50_000,
            max_traceable_blocks: MAX_TRACEABLE_BLOCKS,
            initial_gas_distribution: 52_000_000_0000_0000,
        }
    }

    /// Settings matching the public MainNet.
    pub fn mainnet() -> Self {
        Self {
            network: 860_833_102,
            standby_committee: vec![
                "03b209fd4f53a7170ea4444e0cb0a6bb6a53c2bd016926989cf85f9b0fba17a70c".into(),
                "02df48f60e8f3e01c48ff40b9b7f1310d7a8b2a193188befe1c2e3df740e895093".into(),
                "03b8d9d5771d8f513aa0869b9cc8d50986403b78c6da36890638c3d46a5adce04a".into(),
                "02ca0e27697b9c248f6f16e085fd0061e26f44da85b58ee835c110caa5ec3ba554".into(),
                "024c7b7fb6c310fccf1ba33b082519d82964ea93868d676662d4a59ad548df0e7d".into(),
                "02aaec38470f6aad0042c6e877cfd8087d2676b0f516fddd362801b9bd3936399e".into(),
                "02486fd15702c4490a26703112a5cc1d0923fd697a33406bd5a1c00e0013b09a70".into(),
            ],
            validators_count: 7,
            memory_pool_max_transactions: 50_000,
            ..Self::default_private()
        }
    }

    /// Settings matching the public TestNet.
    pub fn testnet() -> Self {
        Self {
            network: 894_710_606,
            validators_count: 7,
            max_transactions_per_block: 5000,
            ..Self::mainnet()
        }
    }

    /// Settings for the given network flavor.
    pub fn for_network(network: NetworkType) -> Self {
        match network {
            NetworkType::MainNet => Self::mainnet(),
            NetworkType::TestNet => Self::testnet(),
            NetworkType::Private => Self::default_private(),
        }
    }

    /// The number of consensus validators `n`.
    pub fn validator_count(&self) -> usize {
        self.validators_count
    }

    /// The number of Byzantine faults tolerated, `f = (n - 1) / 3`.
    pub fn byzantine_fault_count(&self) -> usize {
        (self.validators_count - 1) / 3
    }

    /// The quorum size `m = n - f` required for agreement.
    pub fn quorum_count(&self) -> usize {
        self.validators_count - self.byzantine_fault_count()
    }

    /// Milliseconds a block may carry as timestamp ahead of local time.
    pub fn time_per_block(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.milliseconds_per_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_math() {
        let settings = ProtocolSettings::default_private();
        assert_eq!(settings.validator_count(), 4);
        assert_eq!(settings.byzantine_fault_count(), 1);
        assert_eq!(settings.quorum_count(), 3);

        let mainnet = ProtocolSettings::mainnet();
        assert_eq!(mainnet.byzantine_fault_count(), 2);
        assert_eq!(mainnet.quorum_count(), 5);
    }

    #[test]
    fn presets_differ_by_magic() {
        assert_ne!(
            ProtocolSettings::mainnet().network,
            ProtocolSettings::testnet().network
        );
    }
}
