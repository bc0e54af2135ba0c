//! Ledger error values.

use thiserror::Error;

/// Errors raised while verifying or persisting blocks.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The block failed structural or witness validation.
    #[error("invalid block: {message}")]
    InvalidBlock { message: String },

    /// Blocks must apply in strictly increasing height order.
    #[error("block {index} does not follow current height {current}")]
    OutOfOrder { index: u32, current: u32 },

    /// A storage commit failed; the node must not advance.
    #[error("storage failure: {0}")]
    Storage(#[from] neo3_persistence::StorageError),

    /// A system execution (OnPersist / PostPersist / genesis) failed.
    /// These scripts must never fail on a valid chain.
    #[error("system execution failed: {message}")]
    SystemExecution { message: String },

    /// Data-model level failure.
    #[error(transparent)]
    Core(#[from] neo3_core::CoreError),
}

impl LedgerError {
    pub fn invalid_block(message: impl Into<String>) -> Self {
        Self::InvalidBlock {
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::SystemExecution {
            message: message.into(),
        }
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
