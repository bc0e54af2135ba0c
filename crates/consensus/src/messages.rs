//! Consensus message types and their wire form.

use neo3_core::UInt256;
use neo3_cryptography::{verify_signature, ECPoint, KeyPair};
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable,
    SerializableExt};

/// Maximum transaction hashes a prepare request may carry.
const MAX_TX_HASHES: usize = neo3_config::MAX_TRANSACTIONS_PER_BLOCK;

/// Why a validator requested a view change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChangeViewReason {
    Timeout = 0x00,
    ChangeAgreement = 0x01,
    TxNotFound = 0x02,
    TxRejectedByPolicy = 0x03,
    TxInvalid = 0x04,
    BlockRejectedByPolicy = 0x05,
}

impl ChangeViewReason {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Timeout),
            0x01 => Some(Self::ChangeAgreement),
            0x02 => Some(Self::TxNotFound),
            0x03 => Some(Self::TxRejectedByPolicy),
            0x04 => Some(Self::TxInvalid),
            0x05 => Some(Self::BlockRejectedByPolicy),
            _ => None,
        }
    }
}

/// The primary's block proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    pub timestamp_ms: u64,
    pub nonce: u64,
    pub tx_hashes: Vec<UInt256>,
}

impl Serializable for PrepareRequest {
    fn size(&self) -> usize {
        8 + 8 + helper::array_size(&self.tx_hashes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u64(self.timestamp_ms)?;
        writer.write_u64(self.nonce)?;
        helper::serialize_array(&self.tx_hashes, writer)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            timestamp_ms: reader.read_u64()?,
            nonce: reader.read_u64()?,
            tx_hashes: helper::deserialize_array(reader, MAX_TX_HASHES)?,
        })
    }
}

/// A backup's agreement with a proposal, identified by the prepare-request
/// payload hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareResponse {
    pub preparation_hash: UInt256,
}

impl Serializable for PrepareResponse {
    fn size(&self) -> usize {
        32
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.preparation_hash.serialize(writer)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            preparation_hash: UInt256::deserialize(reader)?,
        })
    }
}

/// A validator's signature over the proposed block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub signature: Vec<u8>,
}

impl Serializable for Commit {
    fn size(&self) -> usize {
        64
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        if self.signature.len() != 64 {
            return Err(IoError::invalid_format("commit signature must be 64 bytes"));
        }
        writer.write_bytes(&self.signature)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            signature: reader.read_bytes(64)?,
        })
    }
}

/// A request to advance to `new_view_number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeView {
    pub new_view_number: u8,
    pub timestamp_ms: u64,
    pub reason: ChangeViewReason,
}

impl Serializable for ChangeView {
    fn size(&self) -> usize {
        1 + 8 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.new_view_number)?;
        writer.write_u64(self.timestamp_ms)?;
        writer.write_u8(self.reason as u8)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let new_view_number = reader.read_u8()?;
        let timestamp_ms = reader.read_u64()?;
        let reason_byte = reader.read_u8()?;
        let reason = ChangeViewReason::from_byte(reason_byte).ok_or_else(|| {
            IoError::invalid_format(format!("change view reason {reason_byte:#04x}"))
        })?;
        Ok(Self {
            new_view_number,
            timestamp_ms,
            reason,
        })
    }
}

/// A plea from a lagging validator for the current round's evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub timestamp_ms: u64,
}

impl Serializable for RecoveryRequest {
    fn size(&self) -> usize {
        8
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u64(self.timestamp_ms)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            timestamp_ms: reader.read_u64()?,
        })
    }
}

/// The round evidence a validator has collected, bundled for catch-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryMessage {
    pub prepare_request: Option<PrepareRequest>,
    /// The prepare-request payload hash backups agreed to.
    pub preparation_hash: Option<UInt256>,
    /// Validator indices that prepared (request or response).
    pub preparations: Vec<u8>,
    /// `(validator_index, signature)` commit evidence.
    pub commits: Vec<(u8, Vec<u8>)>,
    /// `(validator_index, new_view)` change-view evidence.
    pub change_views: Vec<(u8, u8)>,
}

impl Serializable for RecoveryMessage {
    fn size(&self) -> usize {
        let request_size = 1 + self.prepare_request.as_ref().map_or(0, Serializable::size);
        let hash_size = 1 + self.preparation_hash.map_or(0, |_| 32);
        let preparations =
            helper::var_int_size(self.preparations.len() as u64) + self.preparations.len();
        let commits = helper::var_int_size(self.commits.len() as u64)
            + self.commits.len() * (1 + 64);
        let change_views =
            helper::var_int_size(self.change_views.len() as u64) + self.change_views.len() * 2;
        request_size + hash_size + preparations + commits + change_views
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        match &self.prepare_request {
            Some(request) => {
                writer.write_bool(true)?;
                request.serialize(writer)?;
            }
            None => writer.write_bool(false)?,
        }
        match &self.preparation_hash {
            Some(hash) => {
                writer.write_bool(true)?;
                hash.serialize(writer)?;
            }
            None => writer.write_bool(false)?,
        }
        writer.write_var_int(self.preparations.len() as u64)?;
        for index in &self.preparations {
            writer.write_u8(*index)?;
        }
        writer.write_var_int(self.commits.len() as u64)?;
        for (index, signature) in &self.commits {
            if signature.len() != 64 {
                return Err(IoError::invalid_format("commit signature must be 64 bytes"));
            }
            writer.write_u8(*index)?;
            writer.write_bytes(signature)?;
        }
        writer.write_var_int(self.change_views.len() as u64)?;
        for (index, view) in &self.change_views {
            writer.write_u8(*index)?;
            writer.write_u8(*view)?;
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let prepare_request = if reader.read_bool()? {
            Some(PrepareRequest::deserialize(reader)?)
        } else {
            None
        };
        let preparation_hash = if reader.read_bool()? {
            Some(UInt256::deserialize(reader)?)
        } else {
            None
        };
        let preparation_count =
            reader.read_var_int(neo3_config::MAX_VALIDATORS as u64)? as usize;
        let mut preparations = Vec::with_capacity(preparation_count);
        for _ in 0..preparation_count {
            preparations.push(reader.read_u8()?);
        }
        let commit_count = reader.read_var_int(neo3_config::MAX_VALIDATORS as u64)? as usize;
        let mut commits = Vec::with_capacity(commit_count);
        for _ in 0..commit_count {
            let index = reader.read_u8()?;
            let signature = reader.read_bytes(64)?;
            commits.push((index, signature));
        }
        let cv_count = reader.read_var_int(neo3_config::MAX_VALIDATORS as u64)? as usize;
        let mut change_views = Vec::with_capacity(cv_count);
        for _ in 0..cv_count {
            change_views.push((reader.read_u8()?, reader.read_u8()?));
        }
        Ok(Self {
            prepare_request,
            preparation_hash,
            preparations,
            commits,
            change_views,
        })
    }
}

/// A consensus message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusMessage {
    PrepareRequest(PrepareRequest),
    PrepareResponse(PrepareResponse),
    Commit(Commit),
    ChangeView(ChangeView),
    RecoveryRequest(RecoveryRequest),
    RecoveryMessage(RecoveryMessage),
}

impl ConsensusMessage {
    fn type_byte(&self) -> u8 {
        match self {
            Self::PrepareRequest(_) => 0x00,
            Self::PrepareResponse(_) => 0x01,
            Self::Commit(_) => 0x02,
            Self::ChangeView(_) => 0x03,
            Self::RecoveryRequest(_) => 0x04,
            Self::RecoveryMessage(_) => 0x05,
        }
    }
}

impl Serializable for ConsensusMessage {
    fn size(&self) -> usize {
        1 + match self {
            Self::PrepareRequest(m) => m.size(),
            Self::PrepareResponse(m) => m.size(),
            Self::Commit(m) => m.size(),
            Self::ChangeView(m) => m.size(),
            Self::RecoveryRequest(m) => m.size(),
            Self::RecoveryMessage(m) => m.size(),
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.type_byte())?;
        match self {
            Self::PrepareRequest(m) => m.serialize(writer),
            Self::PrepareResponse(m) => m.serialize(writer),
            Self::Commit(m) => m.serialize(writer),
            Self::ChangeView(m) => m.serialize(writer),
            Self::RecoveryRequest(m) => m.serialize(writer),
            Self::RecoveryMessage(m) => m.serialize(writer),
        }
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        match reader.read_u8()? {
            0x00 => Ok(Self::PrepareRequest(PrepareRequest::deserialize(reader)?)),
            0x01 => Ok(Self::PrepareResponse(PrepareResponse::deserialize(reader)?)),
            0x02 => Ok(Self::Commit(Commit::deserialize(reader)?)),
            0x03 => Ok(Self::ChangeView(ChangeView::deserialize(reader)?)),
            0x04 => Ok(Self::RecoveryRequest(RecoveryRequest::deserialize(reader)?)),
            0x05 => Ok(Self::RecoveryMessage(RecoveryMessage::deserialize(reader)?)),
            other => Err(IoError::invalid_format(format!(
                "consensus message type {other:#04x}"
            ))),
        }
    }
}

/// A signed consensus message bound to a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusPayload {
    pub block_index: u32,
    pub validator_index: u8,
    pub view_number: u8,
    pub message: ConsensusMessage,
    pub signature: Vec<u8>,
}

impl ConsensusPayload {
    pub fn new(
        block_index: u32,
        validator_index: u8,
        view_number: u8,
        message: ConsensusMessage,
    ) -> Self {
        Self {
            block_index,
            validator_index,
            view_number,
            message,
            signature: Vec::new(),
        }
    }

    fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_u32(self.block_index).expect("in-memory write");
        writer.write_u8(self.validator_index).expect("in-memory write");
        writer.write_u8(self.view_number).expect("in-memory write");
        self.message.serialize(&mut writer).expect("in-memory write");
        writer.into_bytes()
    }

    /// The payload identity: double SHA-256 of the unsigned form.
    pub fn hash(&self) -> UInt256 {
        UInt256::from_data(&self.unsigned_bytes())
    }

    /// The message validators sign: network magic followed by the payload
    /// hash.
    pub fn sign_data(&self, network: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(36);
        data.extend_from_slice(&network.to_le_bytes());
        data.extend_from_slice(self.hash().as_bytes());
        data
    }

    /// Signs the payload with a validator key.
    pub fn sign(&mut self, pair: &KeyPair, network: u32) {
        self.signature = pair.sign(&self.sign_data(network));
    }

    /// Verifies the payload signature against the sender's key.
    pub fn verify(&self, validator: &ECPoint, network: u32) -> bool {
        verify_signature(&self.sign_data(network), &self.signature, validator)
    }
}

impl Serializable for ConsensusPayload {
    fn size(&self) -> usize {
        4 + 1 + 1 + self.message.size() + helper::var_bytes_size(&self.signature)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(self.block_index)?;
        writer.write_u8(self.validator_index)?;
        writer.write_u8(self.view_number)?;
        self.message.serialize(writer)?;
        writer.write_var_bytes(&self.signature)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            block_index: reader.read_u32()?,
            validator_index: reader.read_u8()?,
            view_number: reader.read_u8()?,
            message: ConsensusMessage::deserialize(reader)?,
            signature: reader.read_var_bytes(64)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: ConsensusMessage) {
        let payload = ConsensusPayload::new(7, 2, 1, message);
        let back = ConsensusPayload::from_array(&payload.to_array()).unwrap();
        assert_eq!(back, payload);
        assert_eq!(payload.to_array().len(), payload.size());
    }

    #[test]
    fn all_message_kinds_round_trip() {
        round_trip(ConsensusMessage::PrepareRequest(PrepareRequest {
            timestamp_ms: 1000,
            nonce: 42,
            tx_hashes: vec![UInt256::from_data(b"tx1"), UInt256::from_data(b"tx2")],
        }));
        round_trip(ConsensusMessage::PrepareResponse(PrepareResponse {
            preparation_hash: UInt256::from_data(b"request"),
        }));
        round_trip(ConsensusMessage::Commit(Commit {
            signature: vec![7u8; 64],
        }));
        round_trip(ConsensusMessage::ChangeView(ChangeView {
            new_view_number: 1,
            timestamp_ms: 5000,
            reason: ChangeViewReason::Timeout,
        }));
        round_trip(ConsensusMessage::RecoveryRequest(RecoveryRequest {
            timestamp_ms: 9000,
        }));
        round_trip(ConsensusMessage::RecoveryMessage(RecoveryMessage {
            prepare_request: Some(PrepareRequest {
                timestamp_ms: 1,
                nonce: 2,
                tx_hashes: vec![],
            }),
            preparation_hash: Some(UInt256::from_data(b"p")),
            preparations: vec![0, 2],
            commits: vec![(0, vec![1u8; 64])],
            change_views: vec![(1, 1)],
        }));
    }

    #[test]
    fn signature_binds_payload_contents() {
        let pair = KeyPair::generate();
        let mut payload = ConsensusPayload::new(
            1,
            0,
            0,
            ConsensusMessage::RecoveryRequest(RecoveryRequest { timestamp_ms: 1 }),
        );
        payload.sign(&pair, 0x4E);
        assert!(payload.verify(pair.public_key(), 0x4E));

        let mut tampered = payload.clone();
        tampered.block_index = 2;
        assert!(!tampered.verify(pair.public_key(), 0x4E));
        assert!(!payload.verify(pair.public_key(), 0x4F));
    }

    #[test]
    fn unknown_reason_byte_is_rejected() {
        let payload = ConsensusPayload::new(
            1,
            0,
            0,
            ConsensusMessage::ChangeView(ChangeView {
                new_view_number: 1,
                timestamp_ms: 0,
                reason: ChangeViewReason::Timeout,
            }),
        );
        let mut bytes = payload.to_array();
        // The reason byte sits right before the signature length prefix.
        let reason_offset = bytes.len() - 2;
        bytes[reason_offset] = 0x77;
        assert!(ConsensusPayload::from_array(&bytes).is_err());
    }
}
