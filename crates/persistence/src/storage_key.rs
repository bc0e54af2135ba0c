//! Storage keys, items and the on-disk namespace prefixes.

use crate::{StorageError, StorageResult};
use neo3_config::{MAX_STORAGE_KEY_SIZE, MAX_STORAGE_VALUE_SIZE};

/// One-byte prefixes segregating record namespaces in the single store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataPrefix {
    /// Block header by block hash.
    Header = 0x01,
    /// Full block by block hash.
    Block = 0x02,
    /// Block hash by height.
    BlockHashByIndex = 0x03,
    /// Transaction state (tx + execution log metadata) by tx hash.
    Transaction = 0x04,
    /// Contract storage, followed by big-endian contract id and the key.
    ContractStorage = 0x05,
    /// Native-contract bookkeeping state.
    NativeState = 0x06,
    /// The current best height.
    CurrentIndex = 0xF0,
    /// The current best block hash.
    CurrentHash = 0xF1,
}

impl DataPrefix {
    /// A key consisting of this prefix followed by `suffix`.
    pub fn key(self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + suffix.len());
        key.push(self as u8);
        key.extend_from_slice(suffix);
        key
    }
}

/// A contract storage key: contract id plus raw key bytes.
///
/// The contract id encodes big-endian so every contract's records form one
/// contiguous range under the `ContractStorage` prefix; everything else in
/// the system is little-endian.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub contract_id: i32,
    pub key: Vec<u8>,
}

impl StorageKey {
    pub fn new(contract_id: i32, key: impl Into<Vec<u8>>) -> Self {
        Self {
            contract_id,
            key: key.into(),
        }
    }

    /// Validates the key length limit.
    pub fn check(&self) -> StorageResult<()> {
        if self.key.len() > MAX_STORAGE_KEY_SIZE {
            return Err(StorageError::SizeLimit {
                what: "storage key",
                size: self.key.len(),
                limit: MAX_STORAGE_KEY_SIZE,
            });
        }
        Ok(())
    }

    /// The full store key: `ContractStorage ‖ contract_id:be ‖ key`.
    pub fn to_store_key(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.key.len());
        bytes.push(DataPrefix::ContractStorage as u8);
        bytes.extend_from_slice(&self.contract_id.to_be_bytes());
        bytes.extend_from_slice(&self.key);
        bytes
    }

    /// The store-key prefix covering every record of `contract_id`.
    pub fn contract_prefix(contract_id: i32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5);
        bytes.push(DataPrefix::ContractStorage as u8);
        bytes.extend_from_slice(&contract_id.to_be_bytes());
        bytes
    }

    /// Parses a full store key back into its parts.
    pub fn from_store_key(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 5 || bytes[0] != DataPrefix::ContractStorage as u8 {
            return None;
        }
        let contract_id = i32::from_be_bytes(bytes[1..5].try_into().ok()?);
        Some(Self {
            contract_id,
            key: bytes[5..].to_vec(),
        })
    }
}

/// A stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageItem {
    pub value: Vec<u8>,
}

impl StorageItem {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Validates the value length limit.
    pub fn check(&self) -> StorageResult<()> {
        if self.value.len() > MAX_STORAGE_VALUE_SIZE {
            return Err(StorageError::SizeLimit {
                what: "storage value",
                size: self.value.len(),
                limit: MAX_STORAGE_VALUE_SIZE,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_key_round_trip() {
        let key = StorageKey::new(-3, b"balances".to_vec());
        let encoded = key.to_store_key();
        assert_eq!(StorageKey::from_store_key(&encoded), Some(key));
    }

    #[test]
    fn contract_id_is_big_endian_for_contiguous_scans() {
        // Keys of one contract must sort together; big-endian ids keep
        // contract 1's range strictly before contract 2's.
        let a = StorageKey::new(1, vec![0xFF]).to_store_key();
        let b = StorageKey::new(2, vec![0x00]).to_store_key();
        assert!(a < b);
    }

    #[test]
    fn oversized_key_and_value_are_rejected() {
        let key = StorageKey::new(0, vec![0u8; MAX_STORAGE_KEY_SIZE + 1]);
        assert!(key.check().is_err());
        let item = StorageItem::new(vec![0u8; MAX_STORAGE_VALUE_SIZE + 1]);
        assert!(item.check().is_err());
    }
}
