//! Deployed-contract state and the NEF executable container.

use crate::manifest::ContractManifest;
use crate::{ContractError, ContractResult};
use neo3_config::MAX_SCRIPT_LENGTH;
use neo3_core::{UInt160, UInt256};
use neo3_cryptography::hash256;
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable,
    SerializableExt};
use serde::{Deserialize, Serialize};

/// `"NEF3"` little-endian.
pub const NEF_MAGIC: u32 = 0x3346_454E;
/// Fixed width of the compiler field.
pub const NEF_COMPILER_SIZE: usize = 64;
/// Maximum length of the source URL field.
pub const NEF_SOURCE_MAX: usize = 256;
/// Maximum number of method tokens.
pub const NEF_TOKENS_MAX: usize = 128;

/// A static call target bound at deploy time (`CALLT`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodToken {
    pub hash: UInt160,
    pub method: String,
    pub parameters_count: u16,
    pub has_return_value: bool,
    pub call_flags: u8,
}

impl Serializable for MethodToken {
    fn size(&self) -> usize {
        self.hash.size() + helper::var_bytes_size(self.method.as_bytes()) + 2 + 1 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.hash.serialize(writer)?;
        writer.write_var_string(&self.method)?;
        writer.write_u16(self.parameters_count)?;
        writer.write_bool(self.has_return_value)?;
        writer.write_u8(self.call_flags)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            hash: UInt160::deserialize(reader)?,
            method: reader.read_var_string(32)?,
            parameters_count: reader.read_u16()?,
            has_return_value: reader.read_bool()?,
            call_flags: reader.read_u8()?,
        })
    }
}

/// The executable container: compiler metadata, method tokens, script and
/// a double-SHA-256 checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NefFile {
    pub compiler: String,
    pub source: String,
    pub tokens: Vec<MethodToken>,
    pub script: Vec<u8>,
    pub checksum: u32,
}

impl NefFile {
    /// Builds a NEF with a freshly computed checksum.
    pub fn new(compiler: impl Into<String>, script: Vec<u8>) -> ContractResult<Self> {
        let mut nef = Self {
            compiler: compiler.into(),
            source: String::new(),
            tokens: Vec::new(),
            script,
            checksum: 0,
        };
        nef.checksum = nef.compute_checksum()?;
        nef.check()?;
        Ok(nef)
    }

    /// First four bytes of `hash256` over the serialized form without the
    /// checksum field.
    pub fn compute_checksum(&self) -> ContractResult<u32> {
        let mut writer = BinaryWriter::new();
        self.serialize_without_checksum(&mut writer)
            .map_err(ContractError::from)?;
        let digest = hash256(&writer.into_bytes());
        Ok(u32::from_le_bytes(digest[..4].try_into().expect("4 bytes")))
    }

    fn serialize_without_checksum(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(NEF_MAGIC)?;
        let mut compiler = self.compiler.as_bytes().to_vec();
        if compiler.len() > NEF_COMPILER_SIZE {
            return Err(IoError::invalid_format("compiler field too long"));
        }
        compiler.resize(NEF_COMPILER_SIZE, 0);
        writer.write_bytes(&compiler)?;
        writer.write_var_string(&self.source)?;
        writer.write_u8(0)?;
        helper::serialize_array(&self.tokens, writer)?;
        writer.write_u16(0)?;
        writer.write_var_bytes(&self.script)
    }

    /// Structural validation: magic, reserved fields, script bounds and
    /// checksum, as enforced at load time.
    pub fn check(&self) -> ContractResult<()> {
        if self.script.is_empty() {
            return Err(ContractError::invalid_nef("empty script"));
        }
        if self.script.len() > MAX_SCRIPT_LENGTH {
            return Err(ContractError::invalid_nef(format!(
                "script length {}",
                self.script.len()
            )));
        }
        if self.source.len() > NEF_SOURCE_MAX {
            return Err(ContractError::invalid_nef("source field too long"));
        }
        let expected = self.compute_checksum()?;
        if self.checksum != expected {
            return Err(ContractError::invalid_nef(format!(
                "checksum {:#010x}, expected {expected:#010x}",
                self.checksum
            )));
        }
        Ok(())
    }
}

impl Serializable for NefFile {
    fn size(&self) -> usize {
        4 + NEF_COMPILER_SIZE
            + helper::var_bytes_size(self.source.as_bytes())
            + 1
            + helper::array_size(&self.tokens)
            + 2
            + helper::var_bytes_size(&self.script)
            + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_without_checksum(writer)?;
        writer.write_u32(self.checksum)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let magic = reader.read_u32()?;
        if magic != NEF_MAGIC {
            return Err(IoError::invalid_format(format!("NEF magic {magic:#010x}")));
        }
        let compiler_bytes = reader.read_bytes(NEF_COMPILER_SIZE)?;
        let compiler = String::from_utf8_lossy(&compiler_bytes)
            .trim_end_matches('\0')
            .to_string();
        let source = reader.read_var_string(NEF_SOURCE_MAX)?;
        if reader.read_u8()? != 0 {
            return Err(IoError::invalid_format("reserved byte not zero"));
        }
        let tokens = helper::deserialize_array(reader, NEF_TOKENS_MAX)?;
        if reader.read_u16()? != 0 {
            return Err(IoError::invalid_format("reserved word not zero"));
        }
        let script = reader.read_var_bytes(MAX_SCRIPT_LENGTH)?;
        if script.is_empty() {
            return Err(IoError::invalid_format("empty script"));
        }
        let checksum = reader.read_u32()?;
        let nef = Self {
            compiler,
            source,
            tokens,
            script,
            checksum,
        };
        let expected = nef
            .compute_checksum()
            .map_err(|e| IoError::invalid_format(e.to_string()))?;
        if checksum != expected {
            return Err(IoError::invalid_format("NEF checksum mismatch"));
        }
        Ok(nef)
    }
}

/// A deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    /// Sequential id; negative ids are reserved for native contracts.
    pub id: i32,
    pub update_counter: u16,
    pub hash: UInt160,
    pub nef: NefFile,
    pub manifest: ContractManifest,
}

impl ContractState {
    /// The deterministic contract hash derived from the deploying sender,
    /// the NEF checksum and the manifest name.
    pub fn compute_hash(sender: &UInt160, nef_checksum: u32, name: &str) -> UInt160 {
        let mut data = Vec::new();
        data.extend_from_slice(sender.as_bytes());
        data.extend_from_slice(&nef_checksum.to_le_bytes());
        data.extend_from_slice(name.as_bytes());
        UInt160::from_script(&data)
    }

    /// Serialization for the contract-management storage records.
    pub fn to_storage_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("contract state serializes")
    }

    pub fn from_storage_bytes(bytes: &[u8]) -> ContractResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ContractError::invalid_argument(format!("contract state: {e}")))
    }
}

/// Execution log persisted per transaction (state, gas, notifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppExecResult {
    pub tx_hash: UInt256,
    pub halted: bool,
    pub gas_consumed: i64,
    pub exception: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_nef() -> NefFile {
        NefFile::new("neo3-test-compiler", vec![0x40]).unwrap()
    }

    #[test]
    fn nef_round_trip() {
        let nef = sample_nef();
        let back = NefFile::from_array(&nef.to_array()).unwrap();
        assert_eq!(back, nef);
        assert_eq!(nef.to_array().len(), nef.size());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut nef = sample_nef();
        nef.checksum ^= 1;
        assert!(nef.check().is_err());
        assert!(NefFile::from_array(&nef.to_array()).is_err());
    }

    #[test]
    fn corrupted_magic_is_rejected() {
        let mut bytes = sample_nef().to_array();
        bytes[0] ^= 0xFF;
        assert!(NefFile::from_array(&bytes).is_err());
    }

    #[test]
    fn contract_hash_is_deterministic() {
        let sender = UInt160::from_script(b"deployer");
        let a = ContractState::compute_hash(&sender, 7, "token");
        let b = ContractState::compute_hash(&sender, 7, "token");
        let c = ContractState::compute_hash(&sender, 8, "token");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
