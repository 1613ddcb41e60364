//! Error types for entity store operations.

use luminafly_core::{CoreError, EntityId};
use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (drone, pole, base, mission)
        entity: &'static str,
        /// Requested identifier
        id: EntityId,
    },

    /// Write refused because it would break an entity invariant
    #[error("Rejected update: {0}")]
    Rejected(String),

    /// Mission status change not allowed by the lifecycle
    #[error("Lifecycle violation: {0}")]
    Lifecycle(#[from] CoreError),

    /// Stored data could not be mapped back to an entity
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Backend is not reachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database errors
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
