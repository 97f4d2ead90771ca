//! Core error types.

use thiserror::Error;

/// Errors that stop a benchmark before any model is touched.
///
/// Failures inside an adapter are not represented here: they are recorded
/// per execution as [`AdapterError`](crate::adapter::AdapterError).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid driver setup (no adapters, duplicate model name).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed operation rejected at construction time.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
