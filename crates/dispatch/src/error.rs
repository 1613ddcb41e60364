//! Error types for the dispatch engine.

use luminafly_core::EntityId;
use luminafly_store::StoreError;
use thiserror::Error;

/// Errors raised while animating a flight
#[derive(Debug, Error)]
pub enum FlightError {
    /// Flight was cancelled before reaching its destination
    #[error("Flight of drone {drone_id} cancelled at {progress:.2}")]
    Cancelled {
        /// Drone identifier
        drone_id: EntityId,
        /// Progress of the last executed step
        progress: f64,
    },

    /// Position could not be persisted
    #[error("Flight store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that abort a single mission leg
#[derive(Debug, Error)]
pub enum MissionError {
    /// Animation failed or was cancelled
    #[error(transparent)]
    Flight(#[from] FlightError),

    /// Entity store rejected a read or write
    #[error("Mission store error: {0}")]
    Store(#[from] StoreError),

    /// Return base policy found nowhere to land
    #[error("No return base for drone {drone_id}")]
    NoReturnBase {
        /// Drone identifier
        drone_id: EntityId,
    },

    /// Another mission holds the drone
    #[error("Drone {drone_id} is already on a mission")]
    DroneBusy {
        /// Drone identifier
        drone_id: EntityId,
    },
}

impl MissionError {
    /// Whether the leg stopped because the engine is shutting down.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MissionError::Flight(FlightError::Cancelled { .. }))
    }
}

/// Tick-level errors of the dispatcher and failure injector
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Entity store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
