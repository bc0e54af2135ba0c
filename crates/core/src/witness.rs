//! Witnesses: invocation and verification script pairs.

use crate::UInt160;
use neo3_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};

/// Maximum length of an invocation script (signatures only).
pub const MAX_INVOCATION_SCRIPT: usize = 1024;
/// Maximum length of a verification script.
pub const MAX_VERIFICATION_SCRIPT: usize = 1024;

/// Authorization proof attached to a transaction or block header.
///
/// Verifying a witness pushes the invocation script's output onto the
/// evaluation stack and then runs the verification script; it passes when
/// exactly one truthy item remains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Script supplying the signatures.
    pub invocation_script: Vec<u8>,
    /// Script encoding the authorization condition.
    pub verification_script: Vec<u8>,
}

impl Witness {
    pub fn new(invocation_script: Vec<u8>, verification_script: Vec<u8>) -> Self {
        Self {
            invocation_script,
            verification_script,
        }
    }

    /// An empty witness, used as a placeholder while signing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The hash identifying the account this witness answers for.
    pub fn script_hash(&self) -> UInt160 {
        UInt160::from_script(&self.verification_script)
    }
}

impl Serializable for Witness {
    fn size(&self) -> usize {
        helper::var_bytes_size(&self.invocation_script)
            + helper::var_bytes_size(&self.verification_script)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_bytes(&self.invocation_script)?;
        writer.write_var_bytes(&self.verification_script)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            invocation_script: reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?,
            verification_script: reader.read_var_bytes(MAX_VERIFICATION_SCRIPT)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn round_trip() {
        let witness = Witness::new(vec![0x0C, 0x40], vec![0x41, 0x56, 0xE7, 0xB3, 0x27]);
        let back = Witness::from_array(&witness.to_array()).unwrap();
        assert_eq!(back, witness);
        assert_eq!(witness.to_array().len(), witness.size());
    }

    #[test]
    fn script_hash_covers_verification_script_only() {
        let a = Witness::new(vec![1], vec![9, 9, 9]);
        let b = Witness::new(vec![2, 2], vec![9, 9, 9]);
        assert_eq!(a.script_hash(), b.script_hash());
    }
}
