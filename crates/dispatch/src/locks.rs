//! Per-entity exclusion for multi-field commits.
//!
//! Tasks that write several fields of one drone or pole hold that entity's
//! lock for the duration of the commit. When a commit touches a pole and a
//! drone, the pole is locked first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use luminafly_core::EntityId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lockable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// A drone
    Drone(EntityId),
    /// A pole
    Pole(EntityId),
}

/// Guard held while committing to one entity
pub type EntityGuard = OwnedMutexGuard<()>;

/// Table of async mutexes keyed by entity
#[derive(Debug, Default)]
pub struct EntityLocks {
    table: Mutex<HashMap<EntityKey, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: EntityKey) -> EntityGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key).or_default())
        };
        mutex.lock_owned().await
    }

    /// Exclusive access to a drone
    pub async fn drone(&self, id: EntityId) -> EntityGuard {
        self.lock(EntityKey::Drone(id)).await
    }

    /// Exclusive access to a pole
    pub async fn pole(&self, id: EntityId) -> EntityGuard {
        self.lock(EntityKey::Pole(id)).await
    }
}
