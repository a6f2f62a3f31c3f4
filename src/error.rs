//! Error types for the product cache
//!
//! Provides unified error handling using thiserror. Only storage backends
//! surface these errors; the cache itself absorbs and logs them.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and its persistent stores.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Persistent store unavailable or rejected the operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persisted data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure in a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request data (e.g. a malformed storage key)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == Result Type Alias ==
/// Convenience Result type for the product cache.
pub type Result<T> = std::result::Result<T, CacheError>;
