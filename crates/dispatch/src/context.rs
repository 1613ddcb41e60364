//! Shared handles threaded through every engine component.

use std::sync::Arc;

use luminafly_store::EntityStore;

use crate::broadcaster::EventBroadcaster;
use crate::locks::EntityLocks;
use crate::reservations::ReservationTable;
use crate::retry::RetryQueue;

/// Store, event fan-out and coordination state of one engine instance
#[derive(Clone)]
pub struct FleetContext {
    /// Entity store
    pub store: Arc<dyn EntityStore>,
    /// Observer fan-out
    pub broadcaster: Arc<EventBroadcaster>,
    /// Per-entity commit locks
    pub locks: Arc<EntityLocks>,
    /// Repair locks and drone reservations
    pub reservations: Arc<ReservationTable>,
    /// Drones waiting for a recovery flight
    pub retries: Arc<RetryQueue>,
}

impl FleetContext {
    /// Fresh coordination state around `store`
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            broadcaster: Arc::new(EventBroadcaster::new()),
            locks: Arc::new(EntityLocks::new()),
            reservations: ReservationTable::new(),
            retries: Arc::new(RetryQueue::new()),
        }
    }
}
