//! Witness scopes bounding what a signer's authorization covers.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// The scope of a signer's witness.
///
/// Stored as a bit mask on the wire; `Global` excludes every other flag and
/// `None` excludes everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WitnessScope(u8);

impl WitnessScope {
    /// Witness only valid for fee payment, never visible to contracts.
    pub const NONE: Self = Self(0x00);
    /// Valid only when consumed by the entry-script contract.
    pub const CALLED_BY_ENTRY: Self = Self(0x01);
    /// Valid for the contracts listed on the signer.
    pub const CUSTOM_CONTRACTS: Self = Self(0x10);
    /// Valid for contracts belonging to the groups listed on the signer.
    pub const CUSTOM_GROUPS: Self = Self(0x20);
    /// Valid everywhere. Mutually exclusive with all other flags.
    pub const GLOBAL: Self = Self(0x80);

    /// Builds a scope from its wire byte, rejecting undefined bits and a
    /// `Global` flag combined with anything else.
    pub fn from_byte(byte: u8) -> CoreResult<Self> {
        const DEFINED: u8 = 0x01 | 0x10 | 0x20 | 0x80;
        if byte & !DEFINED != 0 {
            return Err(CoreError::invalid_format(format!(
                "undefined witness scope bits {byte:#04x}"
            )));
        }
        if byte & 0x80 != 0 && byte != 0x80 {
            return Err(CoreError::invalid_format(
                "global scope excludes all other flags",
            ));
        }
        Ok(Self(byte))
    }

    /// The wire byte.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether `flag` is present in this scope.
    pub fn has_flag(&self, flag: WitnessScope) -> bool {
        if flag.0 == 0 {
            return self.0 == 0;
        }
        self.0 & flag.0 == flag.0
    }

    /// Combines two scopes.
    pub fn union(&self, other: WitnessScope) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for WitnessScope {
    fn default() -> Self {
        Self::CALLED_BY_ENTRY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_exclusive() {
        assert!(WitnessScope::from_byte(0x80).is_ok());
        assert!(WitnessScope::from_byte(0x81).is_err());
    }

    #[test]
    fn undefined_bits_rejected() {
        assert!(WitnessScope::from_byte(0x02).is_err());
        assert!(WitnessScope::from_byte(0x40).is_err());
    }

    #[test]
    fn flag_queries() {
        let scope = WitnessScope::CALLED_BY_ENTRY.union(WitnessScope::CUSTOM_CONTRACTS);
        assert!(scope.has_flag(WitnessScope::CALLED_BY_ENTRY));
        assert!(scope.has_flag(WitnessScope::CUSTOM_CONTRACTS));
        assert!(!scope.has_flag(WitnessScope::GLOBAL));
        assert!(!scope.has_flag(WitnessScope::NONE));
        assert!(WitnessScope::NONE.has_flag(WitnessScope::NONE));
    }
}
