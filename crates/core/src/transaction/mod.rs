//! Transactions and their verification rules.

mod attribute;

pub use attribute::{OracleResponseCode, TransactionAttribute, MAX_ORACLE_RESULT_SIZE};

use crate::{CoreError, CoreResult, Signer, UInt160, UInt256, Witness};
use neo3_config::{MAX_SCRIPT_LENGTH, MAX_TRANSACTION_ATTRIBUTES, MAX_TRANSACTION_SIZE};
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Maximum number of signers on a transaction.
pub const MAX_SIGNERS: usize = 16;
/// The only transaction version currently defined.
pub const TRANSACTION_VERSION: u8 = 0;
/// Fixed-size portion of the wire form: version, nonce, fees, valid-until.
const HEADER_SIZE: usize = 1 + 4 + 8 + 8 + 4;

/// A ledger transaction.
///
/// The hash covers the unsigned form only; witnesses can be attached or
/// replaced without changing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    pub nonce: u32,
    /// GAS consumed by script execution, in fractions. Never negative.
    pub system_fee: i64,
    /// GAS paid for size and verification, in fractions. Never negative.
    pub network_fee: i64,
    /// Last block height at which this transaction may be included.
    pub valid_until_block: u32,
    pub signers: Vec<Signer>,
    pub attributes: Vec<TransactionAttribute>,
    pub script: Vec<u8>,
    pub witnesses: Vec<Witness>,
}

impl Transaction {
    /// The sender is the first signer; it pays the fees.
    pub fn sender(&self) -> UInt160 {
        self.signers
            .first()
            .map(|s| s.account)
            .unwrap_or_default()
    }

    /// Serializes the fields covered by the hash and signatures.
    pub fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.version)?;
        writer.write_u32(self.nonce)?;
        writer.write_i64(self.system_fee)?;
        writer.write_i64(self.network_fee)?;
        writer.write_u32(self.valid_until_block)?;
        helper::serialize_array(&self.signers, writer)?;
        helper::serialize_array(&self.attributes, writer)?;
        writer.write_var_bytes(&self.script)
    }

    fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)
            .expect("in-memory serialization cannot fail");
        writer.into_bytes()
    }

    /// The transaction hash: double SHA-256 of the unsigned form.
    pub fn hash(&self) -> UInt256 {
        UInt256::from_data(&self.unsigned_bytes())
    }

    /// The message a signer actually signs: network magic followed by the
    /// transaction hash.
    pub fn sign_data(&self, network: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&network.to_le_bytes());
        data.extend_from_slice(self.hash().as_bytes());
        data
    }

    /// The mempool priority key `(system_fee + network_fee) / size`.
    pub fn fee_per_byte(&self) -> i64 {
        let size = self.size() as i64;
        if size == 0 {
            return 0;
        }
        (self.system_fee + self.network_fee) / size
    }

    /// Whether the transaction carries a `HighPriority` attribute.
    pub fn is_high_priority(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| matches!(a, TransactionAttribute::HighPriority))
    }

    /// Hashes named by `Conflicts` attributes.
    pub fn conflicts(&self) -> Vec<UInt256> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                TransactionAttribute::Conflicts { hash } => Some(*hash),
                _ => None,
            })
            .collect()
    }

    /// The `OracleResponse` attribute, if present.
    pub fn oracle_response(&self) -> Option<(u64, OracleResponseCode, &[u8])> {
        self.attributes.iter().find_map(|a| match a {
            TransactionAttribute::OracleResponse { id, code, result } => {
                Some((*id, *code, result.as_slice()))
            }
            _ => None,
        })
    }

    /// The `NotValidBefore` height, if present.
    pub fn not_valid_before(&self) -> Option<u32> {
        self.attributes.iter().find_map(|a| match a {
            TransactionAttribute::NotValidBefore { height } => Some(*height),
            _ => None,
        })
    }

    /// Structural verification: every invariant checkable without state.
    pub fn verify_structure(&self) -> CoreResult<()> {
        if self.version != TRANSACTION_VERSION {
            return Err(CoreError::verification(format!(
                "unknown transaction version {}",
                self.version
            )));
        }
        if self.system_fee < 0 {
            return Err(CoreError::verification("negative system fee"));
        }
        if self.network_fee < 0 {
            return Err(CoreError::verification("negative network fee"));
        }
        if self.script.is_empty() || self.script.len() > MAX_SCRIPT_LENGTH {
            return Err(CoreError::verification(format!(
                "script length {}",
                self.script.len()
            )));
        }
        if self.signers.is_empty() || self.signers.len() > MAX_SIGNERS {
            return Err(CoreError::verification(format!(
                "signer count {}",
                self.signers.len()
            )));
        }
        let mut accounts = HashSet::with_capacity(self.signers.len());
        for signer in &self.signers {
            if !accounts.insert(signer.account) {
                return Err(CoreError::verification(format!(
                    "duplicate signer {}",
                    signer.account
                )));
            }
        }
        if self.attributes.len() > MAX_TRANSACTION_ATTRIBUTES {
            return Err(CoreError::verification("too many attributes"));
        }
        let mut seen_types = HashSet::new();
        for attribute in &self.attributes {
            if !attribute.allows_multiple() && !seen_types.insert(attribute.attribute_type()) {
                return Err(CoreError::verification(format!(
                    "duplicate attribute type {:#04x}",
                    attribute.attribute_type()
                )));
            }
        }
        if self.witnesses.len() != self.signers.len() {
            return Err(CoreError::verification(format!(
                "{} witnesses for {} signers",
                self.witnesses.len(),
                self.signers.len()
            )));
        }
        if self.size() > MAX_TRANSACTION_SIZE {
            return Err(CoreError::verification(format!(
                "transaction size {}",
                self.size()
            )));
        }
        Ok(())
    }
}

impl Serializable for Transaction {
    fn size(&self) -> usize {
        HEADER_SIZE
            + helper::array_size(&self.signers)
            + helper::array_size(&self.attributes)
            + helper::var_bytes_size(&self.script)
            + helper::array_size(&self.witnesses)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_unsigned(writer)?;
        helper::serialize_array(&self.witnesses, writer)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let version = reader.read_u8()?;
        let nonce = reader.read_u32()?;
        let system_fee = reader.read_i64()?;
        let network_fee = reader.read_i64()?;
        let valid_until_block = reader.read_u32()?;
        let signers: Vec<Signer> = helper::deserialize_array(reader, MAX_SIGNERS)?;
        let attributes = helper::deserialize_array(reader, MAX_TRANSACTION_ATTRIBUTES)?;
        let script = reader.read_var_bytes(MAX_SCRIPT_LENGTH)?;
        let witnesses = helper::deserialize_array(reader, MAX_SIGNERS)?;
        let tx = Self {
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            signers,
            attributes,
            script,
            witnesses,
        };
        tx.verify_structure()
            .map_err(|e| IoError::invalid_format(e.to_string()))?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    pub(crate) fn sample_transaction() -> Transaction {
        Transaction {
            version: 0,
            nonce: 0x01020304,
            system_fee: 100,
            network_fee: 200,
            valid_until_block: 1000,
            signers: vec![Signer::called_by_entry(UInt160::from_script(b"sender"))],
            attributes: vec![],
            script: vec![0x11, 0x12, 0x9E, 0x40],
            witnesses: vec![Witness::empty()],
        }
    }

    #[test]
    fn round_trip_preserves_identity() {
        let tx = sample_transaction();
        let back = Transaction::from_array(&tx.to_array()).unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.hash(), tx.hash());
        assert_eq!(tx.to_array().len(), tx.size());
    }

    #[test]
    fn hash_ignores_witnesses() {
        let tx = sample_transaction();
        let mut signed = tx.clone();
        signed.witnesses = vec![Witness::new(vec![1, 2, 3], vec![4, 5, 6])];
        assert_eq!(signed.hash(), tx.hash());
    }

    #[test]
    fn negative_fees_fail_verification() {
        let mut tx = sample_transaction();
        tx.system_fee = -1;
        assert!(tx.verify_structure().is_err());
    }

    #[test]
    fn duplicate_signers_fail_verification() {
        let mut tx = sample_transaction();
        tx.signers.push(tx.signers[0].clone());
        tx.witnesses.push(Witness::empty());
        assert!(tx.verify_structure().is_err());
    }

    #[test]
    fn witness_count_must_match_signers() {
        let mut tx = sample_transaction();
        tx.witnesses.clear();
        assert!(tx.verify_structure().is_err());
    }

    #[test]
    fn empty_script_fails_verification() {
        let mut tx = sample_transaction();
        tx.script.clear();
        assert!(tx.verify_structure().is_err());
    }

    #[test]
    fn sign_data_prefixes_network_magic() {
        let tx = sample_transaction();
        let data = tx.sign_data(0x4E454F33);
        assert_eq!(&data[..4], &0x4E454F33u32.to_le_bytes());
        assert_eq!(&data[4..], tx.hash().as_bytes());
    }
}
