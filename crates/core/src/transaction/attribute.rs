//! Transaction attributes.

use crate::UInt256;
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};

/// Maximum size of an oracle response payload.
pub const MAX_ORACLE_RESULT_SIZE: usize = 65535;

/// Outcome code carried by an oracle response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OracleResponseCode {
    Success = 0x00,
    ProtocolNotSupported = 0x10,
    ConsensusUnreachable = 0x12,
    NotFound = 0x14,
    Timeout = 0x16,
    Forbidden = 0x18,
    ResponseTooLarge = 0x1A,
    InsufficientFunds = 0x1C,
    ContentTypeNotSupported = 0x1F,
    Error = 0xFF,
}

impl OracleResponseCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Success),
            0x10 => Some(Self::ProtocolNotSupported),
            0x12 => Some(Self::ConsensusUnreachable),
            0x14 => Some(Self::NotFound),
            0x16 => Some(Self::Timeout),
            0x18 => Some(Self::Forbidden),
            0x1A => Some(Self::ResponseTooLarge),
            0x1C => Some(Self::InsufficientFunds),
            0x1F => Some(Self::ContentTypeNotSupported),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// A tagged transaction attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAttribute {
    /// Sorts the transaction ahead of fee order; committee only.
    HighPriority,
    /// Marks the transaction as an oracle response delivery.
    OracleResponse {
        id: u64,
        code: OracleResponseCode,
        result: Vec<u8>,
    },
    /// The transaction is invalid before the given height.
    NotValidBefore { height: u32 },
    /// The transaction conflicts with another by hash; only one can land.
    Conflicts { hash: UInt256 },
    /// Notary-assisted transaction with `n_keys` cosigners.
    NotaryAssisted { n_keys: u8 },
}

impl TransactionAttribute {
    /// The wire tag byte.
    pub fn attribute_type(&self) -> u8 {
        match self {
            Self::HighPriority => 0x01,
            Self::OracleResponse { .. } => 0x11,
            Self::NotValidBefore { .. } => 0x20,
            Self::Conflicts { .. } => 0x21,
            Self::NotaryAssisted { .. } => 0x22,
        }
    }

    /// Whether more than one attribute of this kind may appear on a
    /// transaction. Only `Conflicts` repeats.
    pub fn allows_multiple(&self) -> bool {
        matches!(self, Self::Conflicts { .. })
    }
}

impl Serializable for TransactionAttribute {
    fn size(&self) -> usize {
        1 + match self {
            Self::HighPriority => 0,
            Self::OracleResponse { result, .. } => 8 + 1 + helper::var_bytes_size(result),
            Self::NotValidBefore { .. } => 4,
            Self::Conflicts { hash } => hash.size(),
            Self::NotaryAssisted { .. } => 1,
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.attribute_type())?;
        match self {
            Self::HighPriority => Ok(()),
            Self::OracleResponse { id, code, result } => {
                writer.write_u64(*id)?;
                writer.write_u8(*code as u8)?;
                writer.write_var_bytes(result)
            }
            Self::NotValidBefore { height } => writer.write_u32(*height),
            Self::Conflicts { hash } => Serializable::serialize(hash, writer),
            Self::NotaryAssisted { n_keys } => writer.write_u8(*n_keys),
        }
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        match reader.read_u8()? {
            0x01 => Ok(Self::HighPriority),
            0x11 => {
                let id = reader.read_u64()?;
                let code_byte = reader.read_u8()?;
                let code = OracleResponseCode::from_byte(code_byte).ok_or_else(|| {
                    IoError::invalid_format(format!("oracle response code {code_byte:#04x}"))
                })?;
                let result = reader.read_var_bytes(MAX_ORACLE_RESULT_SIZE)?;
                if code != OracleResponseCode::Success && !result.is_empty() {
                    return Err(IoError::invalid_format(
                        "failed oracle response carries a result",
                    ));
                }
                Ok(Self::OracleResponse { id, code, result })
            }
            0x20 => Ok(Self::NotValidBefore {
                height: reader.read_u32()?,
            }),
            0x21 => Ok(Self::Conflicts {
                hash: Serializable::deserialize(reader)?,
            }),
            0x22 => Ok(Self::NotaryAssisted {
                n_keys: reader.read_u8()?,
            }),
            other => Err(IoError::invalid_format(format!(
                "unknown attribute type {other:#04x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn attributes_round_trip() {
        let attributes = vec![
            TransactionAttribute::HighPriority,
            TransactionAttribute::OracleResponse {
                id: 7,
                code: OracleResponseCode::Success,
                result: b"payload".to_vec(),
            },
            TransactionAttribute::NotValidBefore { height: 1000 },
            TransactionAttribute::Conflicts {
                hash: UInt256::from_data(b"other"),
            },
            TransactionAttribute::NotaryAssisted { n_keys: 3 },
        ];
        for attribute in attributes {
            let back = TransactionAttribute::from_array(&attribute.to_array()).unwrap();
            assert_eq!(back, attribute);
            assert_eq!(attribute.to_array().len(), attribute.size());
        }
    }

    #[test]
    fn failed_oracle_response_must_be_empty() {
        let bad = TransactionAttribute::OracleResponse {
            id: 1,
            code: OracleResponseCode::Timeout,
            result: b"junk".to_vec(),
        };
        assert!(TransactionAttribute::from_array(&bad.to_array()).is_err());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(TransactionAttribute::from_array(&[0x55]).is_err());
    }
}
