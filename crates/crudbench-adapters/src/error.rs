//! Adapter-side error types.

use crudbench_core::AdapterError;
use thiserror::Error;

/// Errors raised while talking to a storage engine.
///
/// Converted into [`AdapterError`] at the adapter boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Sled storage error.
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    /// Document encoding error.
    #[error("document encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error while preparing storage.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Unique key already present.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Stored data does not have the expected shape.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The model cannot express the operation.
    #[error("{0}")]
    Unsupported(String),

    /// No open session.
    #[error("not open")]
    NotOpen,
}

impl From<StoreError> for AdapterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unsupported(msg) => AdapterError::Unsupported(msg),
            StoreError::NotOpen => AdapterError::NotOpen,
            other => AdapterError::Engine(other.to_string()),
        }
    }
}

impl From<sled::transaction::TransactionError<StoreError>> for StoreError {
    fn from(err: sled::transaction::TransactionError<StoreError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => StoreError::Sled(e),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
