//! In-memory entity store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use luminafly_core::{Base, Drone, EntityId, Mission, Pole};

use crate::filter::{BaseFilter, DroneFilter, MissionFilter, PoleFilter};
use crate::seed::{NewBase, NewDrone, NewPole, SeedableStore};
use crate::update::{DroneUpdate, MissionUpdate, NewMission, PoleUpdate};
use crate::{EntityStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    drones: BTreeMap<EntityId, Drone>,
    poles: BTreeMap<EntityId, Pole>,
    bases: BTreeMap<EntityId, Base>,
    missions: BTreeMap<EntityId, Mission>,
}

/// Next autoincrement id for a table, like SQLite's `AUTOINCREMENT`.
fn next_id<T>(rows: &BTreeMap<EntityId, T>) -> EntityId {
    rows.keys().next_back().map_or(1, |last| last + 1)
}

/// Entity store backed by ordered maps behind a single mutex.
///
/// Store order is ascending id, which makes "first available" selection
/// deterministic.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    tables: Mutex<Tables>,
}

impl InMemoryEntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn select<T: Clone>(
    rows: &BTreeMap<EntityId, T>,
    keep: impl Fn(&T) -> bool,
    limit: Option<usize>,
) -> Vec<T> {
    rows.values()
        .filter(|row| keep(row))
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

impl EntityStore for InMemoryEntityStore {
    fn drones(&self, filter: &DroneFilter) -> StoreResult<Vec<Drone>> {
        Ok(select(&self.tables().drones, |d| filter.matches(d), filter.limit))
    }

    fn poles(&self, filter: &PoleFilter) -> StoreResult<Vec<Pole>> {
        Ok(select(&self.tables().poles, |p| filter.matches(p), filter.limit))
    }

    fn bases(&self, filter: &BaseFilter) -> StoreResult<Vec<Base>> {
        Ok(select(&self.tables().bases, |b| filter.matches(b), None))
    }

    fn missions(&self, filter: &MissionFilter) -> StoreResult<Vec<Mission>> {
        Ok(select(&self.tables().missions, |m| filter.matches(m), None))
    }

    fn update_drone(&self, id: EntityId, update: &DroneUpdate) -> StoreResult<Drone> {
        let mut tables = self.tables();
        let drone = tables
            .drones
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "drone", id })?;
        update.apply(drone);
        Ok(drone.clone())
    }

    fn update_pole(&self, id: EntityId, update: &PoleUpdate) -> StoreResult<Pole> {
        let mut tables = self.tables();
        if let Some(Some(drone_id)) = update.drone_id {
            if !tables.drones.contains_key(&drone_id) {
                return Err(StoreError::Rejected(format!(
                    "pole {id} cannot hold unknown drone {drone_id}"
                )));
            }
        }
        let pole = tables
            .poles
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "pole", id })?;
        update.apply(pole);
        Ok(pole.clone())
    }

    fn create_mission(&self, mission: &NewMission) -> StoreResult<Mission> {
        let mut tables = self.tables();
        if !tables.drones.contains_key(&mission.drone_id) {
            return Err(StoreError::NotFound {
                entity: "drone",
                id: mission.drone_id,
            });
        }
        let id = next_id(&tables.missions);
        let mission = mission.clone().into_mission(id);
        tables.missions.insert(id, mission.clone());
        Ok(mission)
    }

    fn update_mission(&self, id: EntityId, update: &MissionUpdate) -> StoreResult<Mission> {
        let mut tables = self.tables();
        let mission = tables
            .missions
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "mission", id })?;
        update.apply(mission)?;
        Ok(mission.clone())
    }
}

impl SeedableStore for InMemoryEntityStore {
    fn insert_base(&self, base: &NewBase) -> StoreResult<Base> {
        let mut tables = self.tables();
        let id = next_id(&tables.bases);
        let base = base.clone().into_base(id);
        tables.bases.insert(id, base.clone());
        Ok(base)
    }

    fn insert_pole(&self, pole: &NewPole) -> StoreResult<Pole> {
        let mut tables = self.tables();
        let id = next_id(&tables.poles);
        let pole = pole.clone().into_pole(id);
        tables.poles.insert(id, pole.clone());
        Ok(pole)
    }

    fn insert_drone(&self, drone: &NewDrone) -> StoreResult<Drone> {
        let mut tables = self.tables();
        let id = next_id(&tables.drones);
        let drone = drone.clone().into_drone(id);
        tables.drones.insert(id, drone.clone());
        Ok(drone)
    }
}
