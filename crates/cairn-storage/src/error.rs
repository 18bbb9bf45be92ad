#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used by `cairn-storage`.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by the file store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid relative path: {0:?}")]
    InvalidPath(String),

    #[error("storage operation failed: {0}")]
    Failed(String),

    #[error("operation cancelled")]
    Cancelled,
}
