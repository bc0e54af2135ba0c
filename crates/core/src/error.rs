//! Error types for the data model.

use thiserror::Error;

/// Errors raised while constructing or validating ledger values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value failed its structural invariants.
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },

    /// A serialized payload could not be decoded.
    #[error("deserialization failed: {0}")]
    Io(#[from] neo3_io::IoError),

    /// A transaction or block failed verification.
    #[error("verification failed: {message}")]
    Verification { message: String },
}

impl CoreError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification {
            message: message.into(),
        }
    }
}

/// Result alias for data-model operations.
pub type CoreResult<T> = Result<T, CoreError>;
