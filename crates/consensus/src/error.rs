//! Consensus error values.

use thiserror::Error;

/// Errors raised by the consensus engine. Message-level mismatches drop
/// the offending payload; only local invariant violations propagate.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// A payload failed structural or signature checks.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    /// A payload arrived for a different height or view.
    #[error("payload for block {index} view {view}, expected block {expected_index} view {expected_view}")]
    WrongRound {
        index: u32,
        view: u8,
        expected_index: u32,
        expected_view: u8,
    },

    /// This node is not one of the round's validators.
    #[error("node is not a validator for this round")]
    NotAValidator,

    /// Block assembly or application failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] neo3_ledger::LedgerError),

    /// Signing or key handling failed.
    #[error("crypto error: {message}")]
    Crypto { message: String },
}

impl ConsensusError {
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }
}

/// Result alias for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
