//! 256-bit hash used for transaction, block and Merkle-root hashes.

use crate::{CoreError, CoreResult};
use neo3_cryptography::hash256;
use neo3_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The length of a `UInt256` in bytes.
pub const UINT256_SIZE: usize = 32;

/// A 256-bit hash, little-endian in memory and on the wire, rendered as
/// big-endian hex with a `0x` prefix.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UInt256([u8; UINT256_SIZE]);

impl UInt256 {
    /// The all-zero hash — the `prev_hash` of the genesis block.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; UINT256_SIZE]
    }

    /// Creates a hash from exactly 32 little-endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let array: [u8; UINT256_SIZE] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_format(format!("UInt256 length {}", bytes.len())))?;
        Ok(Self(array))
    }

    /// Double SHA-256 of `data`.
    pub fn from_data(data: &[u8]) -> Self {
        Self(hash256(data))
    }

    /// The little-endian byte representation.
    pub fn as_bytes(&self) -> &[u8; UINT256_SIZE] {
        &self.0
    }

    /// A copy of the little-endian bytes.
    pub fn to_array(&self) -> [u8; UINT256_SIZE] {
        self.0
    }

    /// Parses a big-endian hex string, with or without a `0x` prefix.
    pub fn parse(s: &str) -> CoreResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != UINT256_SIZE * 2 {
            return Err(CoreError::invalid_format(format!(
                "UInt256 hex length {}",
                s.len()
            )));
        }
        let mut bytes =
            hex::decode(s).map_err(|e| CoreError::invalid_format(e.to_string()))?;
        bytes.reverse();
        Self::from_bytes(&bytes)
    }

    /// Big-endian hex form with a `0x` prefix.
    pub fn to_hex_string(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        format!("0x{}", hex::encode(bytes))
    }
}

impl Serializable for UInt256 {
    fn size(&self) -> usize {
        UINT256_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self(reader.read_array::<UINT256_SIZE>()?))
    }
}

impl FromStr for UInt256 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt256({})", self.to_hex_string())
    }
}

impl PartialOrd for UInt256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UInt256 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl From<[u8; UINT256_SIZE]> for UInt256 {
    fn from(bytes: [u8; UINT256_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serialize for UInt256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_string())
    }
}

impl<'de> Deserialize<'de> for UInt256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;
    use proptest::prelude::*;

    #[test]
    fn display_is_big_endian() {
        let mut bytes = [0u8; UINT256_SIZE];
        bytes[0] = 0xAB;
        let hash = UInt256::from(bytes);
        assert!(hash.to_hex_string().ends_with("ab"));
    }

    #[test]
    fn from_data_is_double_sha() {
        assert_eq!(
            UInt256::from_data(b"neo3").to_array(),
            hash256(b"neo3")
        );
    }

    proptest! {
        #[test]
        fn serialization_round_trip(bytes in proptest::array::uniform32(any::<u8>())) {
            let hash = UInt256::from(bytes);
            prop_assert_eq!(UInt256::from_array(&hash.to_array()).unwrap(), hash);
            prop_assert_eq!(UInt256::parse(&hash.to_hex_string()).unwrap(), hash);
        }
    }
}
