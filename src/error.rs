//! Error taxonomy for the ingest/similarity core.
//!
//! The split matters for callers: `InvalidInput` is rejected before any side
//! effect, `ModelLoad` is a service-unavailable condition, `Storage` is an
//! upstream fault that aborted the whole transaction. A seed id with no
//! stored embedding is never an error anywhere in this crate; lookups return
//! an empty result instead.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed request, rejected before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The embedding model failed to load or encode. Not cached; the next
    /// call retries the load from scratch.
    #[error("embedding model unavailable: {0}")]
    ModelLoad(String),

    /// Storage connectivity, constraint, or transaction failure. The whole
    /// operation rolled back; there are no partial writes.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored embedding width does not match the loaded model. Changing
    /// models requires rebuilding the embeddings table.
    #[error("embedding dimension mismatch: stored {stored}, model {model}")]
    DimensionMismatch { stored: usize, model: usize },
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        ServiceError::Storage(e.to_string())
    }
}
