//! Deterministic genesis block construction.

use crate::{LedgerError, LedgerResult};
use neo3_config::ProtocolSettings;
use neo3_core::{Block, BlockHeader, UInt256, Witness};
use neo3_smart_contract::native::neo_token;
use neo3_vm::OpCode;

/// The fixed genesis timestamp (2016-07-15T15:08:21Z, in milliseconds).
pub const GENESIS_TIMESTAMP_MS: u64 = 1_468_595_301_000;
/// The fixed genesis nonce.
pub const GENESIS_NONCE: u64 = 2_083_236_893;

/// Builds the genesis block for a network: height zero, zero previous
/// hash, no transactions, and a trivially true witness.
pub fn genesis_block(settings: &ProtocolSettings) -> LedgerResult<Block> {
    let validators = neo_token::standby_validators(settings)
        .map_err(|e| LedgerError::system(e.to_string()))?;
    let next_consensus = neo3_smart_contract::next_consensus_address(&validators)
        .map_err(|e| LedgerError::system(e.to_string()))?;
    Ok(Block {
        header: BlockHeader {
            version: 0,
            prev_hash: UInt256::zero(),
            merkle_root: UInt256::zero(),
            timestamp_ms: GENESIS_TIMESTAMP_MS,
            nonce: GENESIS_NONCE,
            index: 0,
            primary_index: 0,
            next_consensus,
            witness: Witness::new(Vec::new(), vec![OpCode::PUSH1 as u8]),
        },
        transactions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_deterministic() {
        let settings = ProtocolSettings::default_private();
        let a = genesis_block(&settings).unwrap();
        let b = genesis_block(&settings).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.index(), 0);
        assert!(a.header.prev_hash.is_zero());
    }

    #[test]
    fn different_networks_have_different_genesis() {
        let private = genesis_block(&ProtocolSettings::default_private()).unwrap();
        let mainnet = genesis_block(&ProtocolSettings::mainnet()).unwrap();
        assert_ne!(private.hash(), mainnet.hash());
    }
}
