//! Error types for das-store

use thiserror::Error;

/// Errors that can occur in the scorecard persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Digest string is not 64 hex chars
    #[error("Invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
