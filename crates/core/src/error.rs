//! Core error types

use thiserror::Error;

use crate::types::MissionStatus;

/// Core error type for LuminaFly
#[derive(Debug, Error)]
pub enum CoreError {
    /// Mission status change not allowed by the lifecycle
    #[error("Invalid mission transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status
        from: MissionStatus,
        /// Requested status
        to: MissionStatus,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
