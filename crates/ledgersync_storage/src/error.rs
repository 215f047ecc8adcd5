//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key is not a valid document name.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Another process holds the storage directory lock.
    #[error("storage directory is locked by another process")]
    Locked,

    /// The backend refuses writes.
    #[error("storage is read-only")]
    ReadOnly,

    /// The storage location is unusable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
