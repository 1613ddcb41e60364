//! Swappable allocation and return-base rules.

use luminafly_core::{AllocationStrategy, Base, Coordinate, Drone, EntityId, Pole, ReturnBaseStrategy};

/// Orders candidate drones for a burned-out pole; the first free one wins.
pub trait AllocationPolicy: Send + Sync {
    /// Policy name for logs
    fn name(&self) -> &'static str;

    /// Rank `candidates`, best first
    fn rank(&self, pole: &Pole, candidates: Vec<Drone>) -> Vec<Drone>;
}

/// Keep the order the store returned
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl AllocationPolicy for FirstAvailable {
    fn name(&self) -> &'static str {
        "first_available"
    }

    fn rank(&self, _pole: &Pole, candidates: Vec<Drone>) -> Vec<Drone> {
        candidates
    }
}

/// Closest drone to the pole first; ties keep store order
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestFirst;

impl AllocationPolicy for NearestFirst {
    fn name(&self) -> &'static str {
        "nearest_first"
    }

    fn rank(&self, pole: &Pole, mut candidates: Vec<Drone>) -> Vec<Drone> {
        candidates.sort_by(|a, b| {
            let da = a.position.distance_m(pole.position);
            let db = b.position.distance_m(pole.position);
            da.total_cmp(&db)
        });
        candidates
    }
}

/// Picks the base a drone flies back to
pub trait ReturnBasePolicy: Send + Sync {
    /// Policy name for logs
    fn name(&self) -> &'static str;

    /// Choose among `bases` for a drone currently at `from`
    fn choose(&self, from: Coordinate, bases: &[Base]) -> Option<Base>;
}

/// Always the same depot
#[derive(Debug, Clone, Copy)]
pub struct FixedBase {
    /// Depot base id
    pub base_id: EntityId,
}

impl Default for FixedBase {
    fn default() -> Self {
        Self { base_id: 1 }
    }
}

impl ReturnBasePolicy for FixedBase {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn choose(&self, _from: Coordinate, bases: &[Base]) -> Option<Base> {
        bases.iter().find(|b| b.id == self.base_id).cloned()
    }
}

/// Closest base to the drone
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestBase;

impl ReturnBasePolicy for NearestBase {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn choose(&self, from: Coordinate, bases: &[Base]) -> Option<Base> {
        bases
            .iter()
            .min_by(|a, b| {
                from.distance_m(a.position)
                    .total_cmp(&from.distance_m(b.position))
            })
            .cloned()
    }
}

/// Build the allocation policy named by configuration
pub fn allocation_policy(strategy: AllocationStrategy) -> Box<dyn AllocationPolicy> {
    match strategy {
        AllocationStrategy::FirstAvailable => Box::new(FirstAvailable),
        AllocationStrategy::NearestFirst => Box::new(NearestFirst),
    }
}

/// Build the return-base policy named by configuration
pub fn return_base_policy(strategy: ReturnBaseStrategy) -> Box<dyn ReturnBasePolicy> {
    match strategy {
        ReturnBaseStrategy::Fixed { base_id } => Box::new(FixedBase { base_id }),
        ReturnBaseStrategy::Nearest => Box::new(NearestBase),
    }
}
