//! Error types for binary serialization.

use thiserror::Error;

/// Errors raised while reading or writing binary data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    /// The reader ran past the end of the input.
    #[error("end of stream: needed {needed} more bytes at position {position}")]
    EndOfStream { needed: usize, position: usize },

    /// A length prefix or count exceeded the caller's limit.
    #[error("{what} {value} exceeds maximum {max}")]
    ExceedsLimit {
        what: &'static str,
        value: u64,
        max: u64,
    },

    /// The input bytes do not form a valid value of the expected type.
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },

    /// An operation was attempted in an invalid reader or writer state.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl IoError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Result alias for serialization operations.
pub type IoResult<T> = Result<T, IoError>;
