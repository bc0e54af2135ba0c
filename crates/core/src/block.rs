//! Blocks and block headers.

use crate::{CoreError, CoreResult, Transaction, UInt160, UInt256, Witness};
use neo3_config::{MAX_BLOCK_SIZE, MAX_TRANSACTIONS_PER_BLOCK};
use neo3_cryptography::MerkleTree;
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The only block version currently defined.
pub const BLOCK_VERSION: u32 = 0;

/// A block header.
///
/// The hash covers every field except the witness, which in turn verifies
/// against the previous block's `next_consensus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: UInt256,
    pub merkle_root: UInt256,
    pub timestamp_ms: u64,
    pub nonce: u64,
    pub index: u32,
    pub primary_index: u8,
    /// Script hash of the multisig contract over the next round's validators.
    pub next_consensus: UInt160,
    pub witness: Witness,
}

impl BlockHeader {
    /// Serializes the fields covered by the hash and the consensus
    /// signatures.
    pub fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(self.version)?;
        Serializable::serialize(&self.prev_hash, writer)?;
        Serializable::serialize(&self.merkle_root, writer)?;
        writer.write_u64(self.timestamp_ms)?;
        writer.write_u64(self.nonce)?;
        writer.write_u32(self.index)?;
        writer.write_u8(self.primary_index)?;
        Serializable::serialize(&self.next_consensus, writer)
    }

    fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)
            .expect("in-memory serialization cannot fail");
        writer.into_bytes()
    }

    /// The block hash: double SHA-256 of the unsigned header.
    pub fn hash(&self) -> UInt256 {
        UInt256::from_data(&self.unsigned_bytes())
    }

    /// The message consensus validators sign: network magic followed by the
    /// block hash.
    pub fn sign_data(&self, network: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&network.to_le_bytes());
        data.extend_from_slice(self.hash().as_bytes());
        data
    }
}

impl Serializable for BlockHeader {
    fn size(&self) -> usize {
        4 + 32 + 32 + 8 + 8 + 4 + 1 + 20 + 1 + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_unsigned(writer)?;
        // Headers always carry exactly one witness on the wire.
        writer.write_var_int(1)?;
        Serializable::serialize(&self.witness, writer)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let version = reader.read_u32()?;
        let prev_hash = Serializable::deserialize(reader)?;
        let merkle_root = Serializable::deserialize(reader)?;
        let timestamp_ms = reader.read_u64()?;
        let nonce = reader.read_u64()?;
        let index = reader.read_u32()?;
        let primary_index = reader.read_u8()?;
        let next_consensus = Serializable::deserialize(reader)?;
        let witness_count = reader.read_var_int(1)?;
        if witness_count != 1 {
            return Err(IoError::invalid_format(format!(
                "header witness count {witness_count}"
            )));
        }
        let witness = Serializable::deserialize(reader)?;
        Ok(Self {
            version,
            prev_hash,
            merkle_root,
            timestamp_ms,
            nonce,
            index,
            primary_index,
            next_consensus,
            witness,
        })
    }
}

/// A block: header plus ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block hash (the header hash).
    pub fn hash(&self) -> UInt256 {
        self.header.hash()
    }

    /// The block height.
    pub fn index(&self) -> u32 {
        self.header.index
    }

    /// Hashes of the contained transactions in order.
    pub fn transaction_hashes(&self) -> Vec<UInt256> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    /// Recomputes the Merkle root over the contained transactions.
    pub fn compute_merkle_root(&self) -> UInt256 {
        let hashes: Vec<[u8; 32]> = self
            .transactions
            .iter()
            .map(|tx| tx.hash().to_array())
            .collect();
        UInt256::from(MerkleTree::compute_root(&hashes))
    }

    /// Structural verification of the block in isolation: merkle root,
    /// size limits, transaction uniqueness, per-transaction structure,
    /// `valid_until_block` windows and intra-block conflicts.
    pub fn verify_structure(&self, max_valid_until_block_increment: u32) -> CoreResult<()> {
        if self.transactions.len() > MAX_TRANSACTIONS_PER_BLOCK {
            return Err(CoreError::verification(format!(
                "{} transactions in block",
                self.transactions.len()
            )));
        }
        if self.size() > MAX_BLOCK_SIZE {
            return Err(CoreError::verification(format!(
                "block size {}",
                self.size()
            )));
        }
        if self.compute_merkle_root() != self.header.merkle_root {
            return Err(CoreError::verification("merkle root mismatch"));
        }

        let hashes: HashSet<UInt256> = self.transaction_hashes().into_iter().collect();
        if hashes.len() != self.transactions.len() {
            return Err(CoreError::verification("duplicate transaction in block"));
        }
        for tx in &self.transactions {
            tx.verify_structure()?;
            if self.header.index > tx.valid_until_block
                || tx.valid_until_block > self.header.index + max_valid_until_block_increment
            {
                return Err(CoreError::verification(format!(
                    "transaction {} expired at {}",
                    tx.hash(),
                    tx.valid_until_block
                )));
            }
            for conflict in tx.conflicts() {
                if hashes.contains(&conflict) {
                    return Err(CoreError::verification(
                        "block contains both sides of a conflict",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Serializable for Block {
    fn size(&self) -> usize {
        self.header.size() + helper::array_size(&self.transactions)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        Serializable::serialize(&self.header, writer)?;
        helper::serialize_array(&self.transactions, writer)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            header: Serializable::deserialize(reader)?,
            transactions: helper::deserialize_array(reader, MAX_TRANSACTIONS_PER_BLOCK)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Signer;
    use neo3_io::SerializableExt;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: BLOCK_VERSION,
            prev_hash: UInt256::zero(),
            merkle_root: UInt256::zero(),
            timestamp_ms: 1_600_000_000_000,
            nonce: 42,
            index: 0,
            primary_index: 0,
            next_consensus: UInt160::from_script(b"validators"),
            witness: Witness::new(vec![0x11], vec![0x51]),
        }
    }

    fn sample_tx(nonce: u32, valid_until: u32) -> Transaction {
        Transaction {
            version: 0,
            nonce,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: valid_until,
            signers: vec![Signer::called_by_entry(UInt160::from_script(b"sender"))],
            attributes: vec![],
            script: vec![0x40],
            witnesses: vec![Witness::empty()],
        }
    }

    fn sample_block() -> Block {
        let mut block = Block {
            header: sample_header(),
            transactions: vec![sample_tx(1, 100), sample_tx(2, 100)],
        };
        block.header.merkle_root = block.compute_merkle_root();
        block
    }

    #[test]
    fn header_round_trip() {
        let header = sample_header();
        let back = BlockHeader::from_array(&header.to_array()).unwrap();
        assert_eq!(back, header);
        assert_eq!(header.to_array().len(), header.size());
    }

    #[test]
    fn block_round_trip_preserves_hash() {
        let block = sample_block();
        let back = Block::from_array(&block.to_array()).unwrap();
        assert_eq!(back.hash(), block.hash());
        assert_eq!(block.to_array().len(), block.size());
    }

    #[test]
    fn hash_excludes_witness() {
        let header = sample_header();
        let mut resigned = header.clone();
        resigned.witness = Witness::new(vec![9, 9], vec![8, 8]);
        assert_eq!(resigned.hash(), header.hash());
    }

    #[test]
    fn structure_check_accepts_valid_block() {
        assert!(sample_block().verify_structure(5760).is_ok());
    }

    #[test]
    fn merkle_mismatch_is_rejected() {
        let mut block = sample_block();
        block.header.merkle_root = UInt256::from_data(b"wrong");
        assert!(block.verify_structure(5760).is_err());
    }

    #[test]
    fn duplicate_transactions_are_rejected() {
        let mut block = Block {
            header: sample_header(),
            transactions: vec![sample_tx(1, 100), sample_tx(1, 100)],
        };
        block.header.merkle_root = block.compute_merkle_root();
        assert!(block.verify_structure(5760).is_err());
    }

    #[test]
    fn expired_transaction_is_rejected() {
        let mut block = sample_block();
        block.header.index = 200;
        block.header.merkle_root = block.compute_merkle_root();
        assert!(block.verify_structure(5760).is_err());
    }

    #[test]
    fn conflicting_pair_in_block_is_rejected() {
        let victim = sample_tx(1, 100);
        let mut attacker = sample_tx(2, 100);
        attacker.attributes = vec![crate::TransactionAttribute::Conflicts {
            hash: victim.hash(),
        }];
        let mut block = Block {
            header: sample_header(),
            transactions: vec![victim, attacker],
        };
        block.header.merkle_root = block.compute_merkle_root();
        assert!(block.verify_structure(5760).is_err());
    }
}
