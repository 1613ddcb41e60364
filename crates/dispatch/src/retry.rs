//! Recovery queue for drones stranded by failed mission legs.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use luminafly_core::EntityId;
use tracing::debug;

/// A drone that needs a recovery flight back to a base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryItem {
    /// Stranded drone
    pub drone_id: EntityId,
    /// Mission whose failure stranded it, if one was created
    pub failed_mission_id: Option<EntityId>,
    /// Recovery flights already attempted
    pub attempts: u32,
    /// Failure reason of the last attempt
    pub reason: String,
}

impl RecoveryItem {
    /// First recovery request for a drone
    pub fn new(drone_id: EntityId, failed_mission_id: Option<EntityId>, reason: impl Into<String>) -> Self {
        Self {
            drone_id,
            failed_mission_id,
            attempts: 0,
            reason: reason.into(),
        }
    }
}

/// FIFO of pending recoveries; at most one entry per drone
#[derive(Debug, Default)]
pub struct RetryQueue {
    items: Mutex<VecDeque<RecoveryItem>>,
}

impl RetryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<RecoveryItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `item`, replacing an older entry for the same drone.
    pub fn push(&self, item: RecoveryItem) {
        let mut items = self.items();
        if let Some(existing) = items.iter_mut().find(|i| i.drone_id == item.drone_id) {
            debug!(drone_id = item.drone_id, "Recovery item replaced");
            *existing = item;
        } else {
            debug!(drone_id = item.drone_id, attempts = item.attempts, "Recovery item queued");
            items.push_back(item);
        }
    }

    /// Take every pending item
    pub fn drain(&self) -> Vec<RecoveryItem> {
        self.items().drain(..).collect()
    }

    /// Pending items
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Whether `drone_id` is waiting for recovery
    pub fn contains(&self, drone_id: EntityId) -> bool {
        self.items().iter().any(|i| i.drone_id == drone_id)
    }
}
