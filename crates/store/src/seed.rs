//! Fleet seeding.
//!
//! Records are created outside the dispatch engine; this module gives both
//! backends a common insert surface and builds the demo embankment fleet:
//! one depot plus two satellite bases, fifteen poles, a few drones already
//! installed on poles and a reserve docked at the depot.

use luminafly_core::{
    Base, Coordinate, Drone, DroneLocation, DroneStatus, EntityId, LampStatus, Pole,
};
use tracing::info;

use crate::update::{DroneUpdate, PoleUpdate};
use crate::{EntityStore, StoreResult};

/// Base to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewBase {
    /// Display name
    pub name: String,
    /// Fixed position
    pub position: Coordinate,
    /// Maximum docked drones
    pub capacity: u32,
}

impl NewBase {
    /// Base with the default capacity of 20
    pub fn new(name: impl Into<String>, position: Coordinate) -> Self {
        Self {
            name: name.into(),
            position,
            capacity: 20,
        }
    }

    /// Materialize with an assigned id
    pub fn into_base(self, id: EntityId) -> Base {
        Base {
            id,
            name: self.name,
            position: self.position,
            capacity: self.capacity,
            current_drones: 0,
        }
    }
}

/// Pole to insert; starts working with no drone
#[derive(Debug, Clone, PartialEq)]
pub struct NewPole {
    /// Display name
    pub name: String,
    /// Fixed position
    pub position: Coordinate,
}

impl NewPole {
    /// Working pole at `position`
    pub fn new(name: impl Into<String>, position: Coordinate) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }

    /// Materialize with an assigned id
    pub fn into_pole(self, id: EntityId) -> Pole {
        Pole {
            id,
            name: self.name,
            position: self.position,
            lamp_status: LampStatus::Working,
            drone_id: None,
        }
    }
}

/// Drone to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewDrone {
    /// Display name
    pub name: String,
    /// Unique serial number
    pub serial_number: String,
    /// Initial status
    pub status: DroneStatus,
    /// Initial battery level
    pub battery_level: u8,
    /// Initial position
    pub position: Coordinate,
    /// Initial location
    pub location: DroneLocation,
}

impl NewDrone {
    /// Fully charged drone docked at `base`
    pub fn reserve(name: impl Into<String>, serial_number: impl Into<String>, base: &Base) -> Self {
        Self {
            name: name.into(),
            serial_number: serial_number.into(),
            status: DroneStatus::Active,
            battery_level: 100,
            position: base.position,
            location: DroneLocation::Base(base.id),
        }
    }

    /// Materialize with an assigned id
    pub fn into_drone(self, id: EntityId) -> Drone {
        Drone {
            id,
            name: self.name,
            serial_number: self.serial_number,
            status: self.status,
            lamp_status: LampStatus::Working,
            battery_level: self.battery_level,
            position: self.position,
            location: self.location,
            total_missions: 0,
        }
    }
}

/// Stores that accept new fleet records.
pub trait SeedableStore: EntityStore {
    /// Insert a base
    fn insert_base(&self, base: &NewBase) -> StoreResult<Base>;
    /// Insert a pole
    fn insert_pole(&self, pole: &NewPole) -> StoreResult<Pole>;
    /// Insert a drone
    fn insert_drone(&self, drone: &NewDrone) -> StoreResult<Drone>;

    /// Dock a drone on a pole and record it as the pole's drone
    fn install_drone(&self, drone_id: EntityId, pole: &Pole) -> StoreResult<Drone> {
        let drone = self.update_drone(
            drone_id,
            &DroneUpdate::new()
                .location(DroneLocation::Pole(pole.id))
                .position(pole.position),
        )?;
        self.update_pole(pole.id, &PoleUpdate::new().drone_id(Some(drone_id)))?;
        Ok(drone)
    }
}

/// Shape of the demo fleet
#[derive(Debug, Clone)]
pub struct DemoFleet {
    /// Bases; the first one is the depot reserves dock at
    pub bases: Vec<NewBase>,
    /// Poles in store order
    pub poles: Vec<NewPole>,
    /// Drones installed on the first poles
    pub installed_drones: u32,
    /// Reserve drones docked at the depot
    pub reserve_drones: u32,
}

impl Default for DemoFleet {
    fn default() -> Self {
        let embankment = (1..=8).map(|i| {
            let i = f64::from(i);
            NewPole::new(
                format!("Pole #{} - Kremlin Embankment", i),
                Coordinate::new(55.7962 + 0.00026 * i, 49.1038 + 0.00072 * i),
            )
        });
        let street = (9..=15).map(|i| {
            let k = f64::from(i - 9);
            NewPole::new(
                format!("Pole #{} - Moskovskaya St", i),
                Coordinate::new(55.7958 - 0.00027 * k, 49.1070 + 0.00075 * k),
            )
        });

        Self {
            bases: vec![
                NewBase::new("Base #1 - Kremlin", Coordinate::new(55.7985, 49.1050)),
                NewBase {
                    capacity: 15,
                    ..NewBase::new("Base #2 - Moskovskaya", Coordinate::new(55.7940, 49.1120))
                },
                NewBase {
                    capacity: 15,
                    ..NewBase::new("Base #3 - Central", Coordinate::new(55.7960, 49.1110))
                },
            ],
            poles: embankment.chain(street).collect(),
            installed_drones: 4,
            reserve_drones: 20,
        }
    }
}

/// Everything [`seed_demo_fleet`] created
#[derive(Debug, Clone)]
pub struct SeededFleet {
    /// Bases in insert order
    pub bases: Vec<Base>,
    /// Poles in insert order
    pub poles: Vec<Pole>,
    /// Drones installed on poles
    pub installed: Vec<Drone>,
    /// Drones docked at the depot
    pub reserves: Vec<Drone>,
}

/// Populate an empty store with `fleet`.
pub fn seed_demo_fleet<S: SeedableStore + ?Sized>(store: &S, fleet: &DemoFleet) -> StoreResult<SeededFleet> {
    let bases = fleet
        .bases
        .iter()
        .map(|b| store.insert_base(b))
        .collect::<StoreResult<Vec<_>>>()?;
    let poles = fleet
        .poles
        .iter()
        .map(|p| store.insert_pole(p))
        .collect::<StoreResult<Vec<_>>>()?;

    let mut installed = Vec::new();
    let mut reserves = Vec::new();
    if let Some(depot) = bases.first() {
        for (i, pole) in poles.iter().take(fleet.installed_drones as usize).enumerate() {
            let drone = store.insert_drone(&NewDrone::reserve(
                format!("Firefly-{}", i + 1),
                format!("LF-2024-{:04}", i + 1),
                depot,
            ))?;
            installed.push(store.install_drone(drone.id, pole)?);
        }
        for i in 1..=fleet.reserve_drones {
            reserves.push(store.insert_drone(&NewDrone::reserve(
                format!("Reserve-{}", i),
                format!("RSV-{:04}", i),
                depot,
            ))?);
        }
    }

    let poles = poles
        .iter()
        .map(|p| store.pole(p.id))
        .collect::<StoreResult<Vec<_>>>()?;

    info!(
        bases = bases.len(),
        poles = poles.len(),
        installed = installed.len(),
        reserves = reserves.len(),
        "Seeded demo fleet"
    );

    Ok(SeededFleet {
        bases,
        poles,
        installed,
        reserves,
    })
}
