//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A revision-checked update lost the race: the stored license
    /// record moved since it was read.
    #[error("license record revision conflict: expected {expected}, found {found}")]
    RevisionConflict {
        /// Revision the caller read.
        expected: i64,
        /// Revision currently stored.
        found: i64,
    },

    /// JSON (de)serialization of a stored column failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
