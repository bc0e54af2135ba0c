//! 160-bit hash used for script hashes and account addresses.

use crate::{CoreError, CoreResult};
use neo3_cryptography::{base58check_decode, base58check_encode, hash160};
use neo3_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The length of a `UInt160` in bytes.
pub const UINT160_SIZE: usize = 20;

/// A 160-bit hash, little-endian in memory and on the wire, rendered as
/// big-endian hex with a `0x` prefix.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UInt160([u8; UINT160_SIZE]);

impl UInt160 {
    /// The all-zero hash.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; UINT160_SIZE]
    }

    /// Creates a hash from exactly 20 little-endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let array: [u8; UINT160_SIZE] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_format(format!("UInt160 length {}", bytes.len())))?;
        Ok(Self(array))
    }

    /// The script hash of a verification script.
    pub fn from_script(script: &[u8]) -> Self {
        Self(hash160(script))
    }

    /// The little-endian byte representation.
    pub fn as_bytes(&self) -> &[u8; UINT160_SIZE] {
        &self.0
    }

    /// A copy of the little-endian bytes.
    pub fn to_array(&self) -> [u8; UINT160_SIZE] {
        self.0
    }

    /// Parses a big-endian hex string, with or without a `0x` prefix.
    pub fn parse(s: &str) -> CoreResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != UINT160_SIZE * 2 {
            return Err(CoreError::invalid_format(format!(
                "UInt160 hex length {}",
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

    /// Base58Check address form: `version_byte ‖ hash`.
    pub fn to_address(&self, address_version: u8) -> String {
        let mut payload = Vec::with_capacity(1 + UINT160_SIZE);
        payload.push(address_version);
        payload.extend_from_slice(&self.0);
        base58check_encode(&payload)
    }

    /// Parses a Base58Check address back into a script hash.
    pub fn from_address(address: &str, address_version: u8) -> CoreResult<Self> {
        let payload = base58check_decode(address)
            .map_err(|e| CoreError::invalid_format(e.to_string()))?;
        if payload.len() != 1 + UINT160_SIZE {
            return Err(CoreError::invalid_format("address payload length"));
        }
        if payload[0] != address_version {
            return Err(CoreError::invalid_format(format!(
                "address version {:#04x}",
                payload[0]
            )));
        }
        Self::from_bytes(&payload[1..])
    }
}

impl Serializable for UInt160 {
    fn size(&self) -> usize {
        UINT160_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self(reader.read_array::<UINT160_SIZE>()?))
    }
}

impl FromStr for UInt160 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl fmt::Debug for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt160({})", self.to_hex_string())
    }
}

// Total order over the big-endian value, so sorting matches the displayed
// hex form.
impl PartialOrd for UInt160 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UInt160 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl From<[u8; UINT160_SIZE]> for UInt160 {
    fn from(bytes: [u8; UINT160_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serialize for UInt160 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_string())
    }
}

impl<'de> Deserialize<'de> for UInt160 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn hex_round_trip_is_big_endian() {
        let hash = UInt160::parse("0x0000000000000000000000000000000000000001").unwrap();
        // Big-endian hex "…01" lands in the first little-endian byte.
        assert_eq!(hash.as_bytes()[0], 1);
        assert_eq!(
            hash.to_hex_string(),
            "0x0000000000000000000000000000000000000001"
        );
    }

    #[test]
    fn wire_form_is_little_endian() {
        let hash = UInt160::parse("0x0000000000000000000000000000000000000001").unwrap();
        assert_eq!(hash.to_array()[0], 1);
        assert_eq!(UInt160::from_array(&hash.to_array()).unwrap(), hash);
    }

    #[test]
    fn ordering_follows_displayed_value() {
        let small = UInt160::parse("0x0000000000000000000000000000000000000001").unwrap();
        let large = UInt160::parse("0x0100000000000000000000000000000000000000").unwrap();
        assert!(small < large);
    }

    #[test]
    fn address_round_trip() {
        let hash = UInt160::from_script(b"verification script");
        let address = hash.to_address(0x35);
        assert_eq!(UInt160::from_address(&address, 0x35).unwrap(), hash);
        assert!(UInt160::from_address(&address, 0x17).is_err());
    }

    #[test]
    fn parse_rejects_bad_lengths() {
        assert!(UInt160::parse("0x01").is_err());
        assert!(UInt160::parse("zz").is_err());
    }
}
