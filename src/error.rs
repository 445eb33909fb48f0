//! Error types for the persistence layer.
//!
//! The store itself never fails. These errors come from storage backends and
//! from the codec that turns state into persisted strings.

/// Errors from a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error from the underlying medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The key cannot be used with this backend.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Errors from serializing or deserializing a state snapshot.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding or decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload decoded but is not an acceptable state.
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
