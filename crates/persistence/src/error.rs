//! Storage error values.

use thiserror::Error;

/// Errors raised by storage backends and the cache layer.
///
/// A failed commit is fatal for the block being applied: the snapshot is
/// discarded and the previously committed state stays current.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend rejected or failed a read or write.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// A key or value exceeded its size limit.
    #[error("{what} of {size} bytes exceeds limit {limit}")]
    SizeLimit {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    /// The database could not be opened.
    #[error("failed to open database at {path}: {message}")]
    Open { path: String, message: String },
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
