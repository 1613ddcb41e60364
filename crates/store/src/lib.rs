//! LuminaFly entity store
//!
//! The dispatch engine reads and writes drones, poles, bases and missions
//! through the [`EntityStore`] trait. Two backends are provided:
//! - [`InMemoryEntityStore`]: a mutex-guarded table set for tests and demos
//! - [`SqliteEntityStore`]: a SQLite database (feature `sqlite`, on by default)
//!
//! Each call is synchronous and applies atomically on its own; callers that
//! need several writes to look atomic serialize them per entity.
//!
//! # Examples
//!
//! ```
//! use luminafly_store::{seed, DroneFilter, EntityStore, InMemoryEntityStore};
//!
//! let store = InMemoryEntityStore::new();
//! seed::seed_demo_fleet(&store, &seed::DemoFleet::default()).unwrap();
//!
//! let reserves = store.drones(&DroneFilter::available(30)).unwrap();
//! assert_eq!(reserves.len(), 20);
//! ```

#![warn(missing_docs)]

pub mod error;
#[allow(missing_docs)]
pub mod filter;
pub mod memory;
pub mod seed;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[allow(missing_docs)]
pub mod update;

use luminafly_core::{Base, Drone, EntityId, Mission, Pole};

pub use error::{StoreError, StoreResult};
pub use filter::{BaseFilter, DroneFilter, MissionFilter, PoleFilter};
pub use memory::InMemoryEntityStore;
pub use seed::{NewBase, NewDrone, NewPole, SeedableStore};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEntityStore;
pub use update::{DroneUpdate, MissionUpdate, NewMission, PoleUpdate};

/// Read/update access to fleet records.
pub trait EntityStore: Send + Sync {
    /// Drones matching `filter`, in store order
    fn drones(&self, filter: &DroneFilter) -> StoreResult<Vec<Drone>>;

    /// Poles matching `filter`, in store order
    fn poles(&self, filter: &PoleFilter) -> StoreResult<Vec<Pole>>;

    /// Bases matching `filter`, in store order
    fn bases(&self, filter: &BaseFilter) -> StoreResult<Vec<Base>>;

    /// Missions matching `filter`, in store order
    fn missions(&self, filter: &MissionFilter) -> StoreResult<Vec<Mission>>;

    /// Apply `update` and return the drone as stored afterwards
    fn update_drone(&self, id: EntityId, update: &DroneUpdate) -> StoreResult<Drone>;

    /// Apply `update` and return the pole as stored afterwards
    fn update_pole(&self, id: EntityId, update: &PoleUpdate) -> StoreResult<Pole>;

    /// Insert a mission and return it with its assigned id
    fn create_mission(&self, mission: &NewMission) -> StoreResult<Mission>;

    /// Move a mission through its lifecycle
    ///
    /// Fails with [`StoreError::Lifecycle`] on an illegal transition.
    fn update_mission(&self, id: EntityId, update: &MissionUpdate) -> StoreResult<Mission>;

    /// Single drone by id
    fn drone(&self, id: EntityId) -> StoreResult<Drone> {
        self.drones(&DroneFilter::by_id(id))?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound { entity: "drone", id })
    }

    /// Single pole by id
    fn pole(&self, id: EntityId) -> StoreResult<Pole> {
        self.poles(&PoleFilter::by_id(id))?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound { entity: "pole", id })
    }

    /// Single base by id
    fn base(&self, id: EntityId) -> StoreResult<Base> {
        self.bases(&BaseFilter::by_id(id))?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound { entity: "base", id })
    }

    /// Single mission by id
    fn mission(&self, id: EntityId) -> StoreResult<Mission> {
        self.missions(&MissionFilter::by_id(id))?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound { entity: "mission", id })
    }
}
