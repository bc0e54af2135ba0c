//! Transaction signers and their scope payloads.

use crate::{UInt160, WitnessScope};
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};

/// Maximum sub-items (contracts or groups) a signer scope may list.
pub const MAX_SUBITEMS: usize = 16;

/// An account authorizing a transaction, with the scope of that authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    /// The account whose witness must be present.
    pub account: UInt160,
    /// How far the authorization reaches.
    pub scopes: WitnessScope,
    /// Contracts the witness covers under `CustomContracts`.
    pub allowed_contracts: Vec<UInt160>,
    /// Compressed public keys of groups covered under `CustomGroups`.
    pub allowed_groups: Vec<Vec<u8>>,
}

impl Signer {
    /// A signer scoped to the entry contract only.
    pub fn called_by_entry(account: UInt160) -> Self {
        Self {
            account,
            scopes: WitnessScope::CALLED_BY_ENTRY,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
        }
    }

    /// A signer with global scope.
    pub fn global(account: UInt160) -> Self {
        Self {
            account,
            scopes: WitnessScope::GLOBAL,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
        }
    }
}

impl Serializable for Signer {
    fn size(&self) -> usize {
        let mut size = self.account.size() + 1;
        if self.scopes.has_flag(WitnessScope::CUSTOM_CONTRACTS) {
            size += helper::array_size(&self.allowed_contracts);
        }
        if self.scopes.has_flag(WitnessScope::CUSTOM_GROUPS) {
            size += helper::var_int_size(self.allowed_groups.len() as u64);
            size += self.allowed_groups.iter().map(|g| g.len()).sum::<usize>();
        }
        size
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        Serializable::serialize(&self.account, writer)?;
        writer.write_u8(self.scopes.bits())?;
        if self.scopes.has_flag(WitnessScope::CUSTOM_CONTRACTS) {
            helper::serialize_array(&self.allowed_contracts, writer)?;
        }
        if self.scopes.has_flag(WitnessScope::CUSTOM_GROUPS) {
            writer.write_var_int(self.allowed_groups.len() as u64)?;
            for group in &self.allowed_groups {
                writer.write_bytes(group)?;
            }
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let account: UInt160 = Serializable::deserialize(reader)?;
        let scopes = WitnessScope::from_byte(reader.read_u8()?)
            .map_err(|e| IoError::invalid_format(e.to_string()))?;
        let allowed_contracts = if scopes.has_flag(WitnessScope::CUSTOM_CONTRACTS) {
            helper::deserialize_array(reader, MAX_SUBITEMS)?
        } else {
            Vec::new()
        };
        let allowed_groups = if scopes.has_flag(WitnessScope::CUSTOM_GROUPS) {
            let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
            let mut groups = Vec::with_capacity(count);
            for _ in 0..count {
                // Compressed secp256r1 point.
                groups.push(reader.read_bytes(33)?);
            }
            groups
        } else {
            Vec::new()
        };
        Ok(Self {
            account,
            scopes,
            allowed_contracts,
            allowed_groups,
        })
    }
}
