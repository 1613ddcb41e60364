//! Repair locks and drone reservations.
//!
//! A pole under repair and a drone on a mission are each recorded here by a
//! [`Lease`]. Leases release themselves when dropped, so a mission task that
//! ends for any reason gives its pole and drone back. Every lease carries a
//! unique token; a lease that outlives a [`ReservationTable::clear`] cannot
//! release a newer holder's reservation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use luminafly_core::{Drone, EntityId};
use tracing::trace;

/// What a lease holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationKey {
    /// Repair lock on a pole
    Pole(EntityId),
    /// Mission reservation on a drone
    Drone(EntityId),
}

/// Process-wide reservation state owned by the dispatcher
#[derive(Debug, Default)]
pub struct ReservationTable {
    held: Mutex<HashMap<ReservationKey, u64>>,
    next_token: AtomicU64,
}

/// Outcome of [`ReservationTable::acquire_repair`]
pub enum Acquisition<T> {
    /// Pole and drone are now held
    Acquired(RepairAssignment<T>),
    /// Another mission already repairs the pole
    PoleLocked,
    /// Every candidate drone is held by another mission
    NoDrone,
}

/// Leases and commit result of a successful allocation
pub struct RepairAssignment<T> {
    /// Drone chosen for the repair
    pub drone: Drone,
    /// Repair lock on the pole
    pub pole_lease: Lease,
    /// Reservation on the drone
    pub drone_lease: Lease,
    /// Value returned by the commit closure
    pub value: T,
}

impl ReservationTable {
    /// Create an empty table
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn held(&self) -> MutexGuard<'_, HashMap<ReservationKey, u64>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn grant(self: &Arc<Self>, held: &mut HashMap<ReservationKey, u64>, key: ReservationKey) -> Lease {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        held.insert(key, token);
        trace!(?key, token, "Reservation granted");
        Lease {
            table: Arc::clone(self),
            key,
            token,
        }
    }

    /// Whether `key` is currently held
    pub fn is_held(&self, key: ReservationKey) -> bool {
        self.held().contains_key(&key)
    }

    /// Whether a repair of `pole_id` is in progress
    pub fn is_pole_locked(&self, pole_id: EntityId) -> bool {
        self.is_held(ReservationKey::Pole(pole_id))
    }

    /// Whether `drone_id` is on a mission
    pub fn is_drone_reserved(&self, drone_id: EntityId) -> bool {
        self.is_held(ReservationKey::Drone(drone_id))
    }

    /// Number of poles under repair
    pub fn locked_poles(&self) -> usize {
        self.held()
            .keys()
            .filter(|k| matches!(k, ReservationKey::Pole(_)))
            .count()
    }

    /// Reserve a single drone, e.g. for a return flight
    pub fn reserve_drone(self: &Arc<Self>, drone_id: EntityId) -> Option<Lease> {
        let mut held = self.held();
        let key = ReservationKey::Drone(drone_id);
        if held.contains_key(&key) {
            return None;
        }
        Some(self.grant(&mut held, key))
    }

    /// Lock `pole_id` and reserve the first free drone of `candidates`.
    ///
    /// `commit` runs with the table held, so the lock, the reservation and
    /// whatever `commit` records form one atomic step. It may return
    /// `Ok(None)` to reject a candidate whose snapshot went stale; the next
    /// free candidate is tried. Nothing is held if `commit` fails.
    pub fn acquire_repair<T, E>(
        self: &Arc<Self>,
        pole_id: EntityId,
        candidates: Vec<Drone>,
        mut commit: impl FnMut(&Drone) -> Result<Option<T>, E>,
    ) -> Result<Acquisition<T>, E> {
        let mut held = self.held();
        if held.contains_key(&ReservationKey::Pole(pole_id)) {
            return Ok(Acquisition::PoleLocked);
        }

        for drone in candidates {
            if held.contains_key(&ReservationKey::Drone(drone.id)) {
                continue;
            }
            let Some(value) = commit(&drone)? else {
                continue;
            };
            let pole_lease = self.grant(&mut held, ReservationKey::Pole(pole_id));
            let drone_lease = self.grant(&mut held, ReservationKey::Drone(drone.id));
            return Ok(Acquisition::Acquired(RepairAssignment {
                drone,
                pole_lease,
                drone_lease,
                value,
            }));
        }
        Ok(Acquisition::NoDrone)
    }

    /// Forget every reservation
    pub fn clear(&self) -> usize {
        let mut held = self.held();
        let count = held.len();
        held.clear();
        count
    }

    fn release(&self, key: ReservationKey, token: u64) {
        let mut held = self.held();
        if held.get(&key) == Some(&token) {
            held.remove(&key);
            trace!(?key, token, "Reservation released");
        }
    }
}

/// Held reservation; released on drop
pub struct Lease {
    table: Arc<ReservationTable>,
    key: ReservationKey,
    token: u64,
}

impl Lease {
    /// What this lease holds
    pub fn key(&self) -> ReservationKey {
        self.key
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.table.release(self.key, self.token);
    }
}
