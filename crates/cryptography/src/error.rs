//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors raised by key and point decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Input bytes do not encode a valid curve point.
    #[error("invalid point encoding: {message}")]
    InvalidPoint { message: String },

    /// Input bytes do not encode a valid private key.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// A Base58Check payload failed its checksum or shape checks.
    #[error("invalid base58check data: {message}")]
    InvalidBase58 { message: String },
}

impl CryptoError {
    pub fn invalid_point(message: impl Into<String>) -> Self {
        Self::InvalidPoint {
            message: message.into(),
        }
    }

    pub fn invalid_base58(message: impl Into<String>) -> Self {
        Self::InvalidBase58 {
            message: message.into(),
        }
    }
}

/// Result alias for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
