//! Fixtures shared by the integration suites

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use luminafly_core::{
    logging, Base, Config, Drone, DroneLocation, DroneStatus, EntityId, FlightConfig, Mission, Pole,
};
use luminafly_dispatch::{ControlLoop, Frame};
use luminafly_store::seed::{seed_demo_fleet, DemoFleet, SeededFleet};
use luminafly_store::{
    BaseFilter, DroneFilter, DroneUpdate, EntityStore, InMemoryEntityStore, MissionFilter,
    MissionUpdate, NewBase, NewDrone, NewMission, NewPole, PoleFilter, PoleUpdate, SeedableStore,
    StoreError, StoreResult,
};
use tokio::sync::mpsc;

/// Engine timing for tests: 50-100 ms ticks, 100 ms legs in four steps
pub fn fast_config(seed: Option<u64>) -> Config {
    let mut config = Config::default();
    config.simulation.interval_min_ms = 50;
    config.simulation.interval_max_ms = 100;
    config.simulation.seed = seed;
    config.flight = FlightConfig {
        duration_ms: 100,
        steps: 4,
    };
    config
}

/// Seeded in-memory engine and what was seeded
pub fn seeded_engine(seed: u64) -> (ControlLoop, SeededFleet) {
    logging::try_init_test();
    let store = Arc::new(InMemoryEntityStore::new());
    let fleet = seed_demo_fleet(store.as_ref(), &DemoFleet::default()).unwrap();
    (ControlLoop::new(store, &fast_config(Some(seed))), fleet)
}

/// Seed `store` and wrap it in an engine
pub fn engine_over<S: SeedableStore + 'static>(store: Arc<S>, seed: u64) -> (ControlLoop, SeededFleet) {
    logging::try_init_test();
    let fleet = seed_demo_fleet(store.as_ref(), &DemoFleet::default()).unwrap();
    (ControlLoop::new(store, &fast_config(Some(seed))), fleet)
}

/// Take every frame already delivered to `rx`, parsed
pub fn drain_events(rx: &mut mpsc::Receiver<Frame>) -> Vec<serde_json::Value> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|frame| serde_json::from_str(&frame).unwrap())
        .collect()
}

/// Position of the first event of `kind` matching `pred`
pub fn position_of(
    events: &[serde_json::Value],
    kind: &str,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> Option<usize> {
    events
        .iter()
        .position(|e| e["type"] == kind && pred(&e["data"]))
}

/// Make every reserve except `keep` unavailable
pub fn ground_reserves(engine: &ControlLoop, fleet: &SeededFleet, keep: usize) {
    for drone in fleet.reserves.iter().skip(keep) {
        engine
            .store()
            .update_drone(drone.id, &DroneUpdate::new().status(DroneStatus::Maintenance))
            .unwrap();
    }
}

/// In-progress missions for one drone
pub fn in_progress_for_drone(store: &dyn EntityStore, drone_id: EntityId) -> Vec<Mission> {
    store
        .missions(&MissionFilter {
            drone_id: Some(drone_id),
            ..MissionFilter::in_progress()
        })
        .unwrap()
}

/// Store wrapper that can reject pole reads and some drone writes on demand
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryEntityStore,
    fail_positions: AtomicBool,
    fail_next_install: AtomicBool,
    fail_pole_reads: AtomicBool,
}

impl FlakyStore {
    /// Healthy store
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or stop rejecting position writes
    pub fn fail_position_writes(&self, fail: bool) {
        self.fail_positions.store(fail, Ordering::SeqCst);
    }

    /// Reject the next write that lands a drone on a pole
    pub fn fail_next_install(&self) {
        self.fail_next_install.store(true, Ordering::SeqCst);
    }

    /// Start or stop rejecting every pole read
    pub fn fail_pole_reads(&self, fail: bool) {
        self.fail_pole_reads.store(fail, Ordering::SeqCst);
    }
}

impl EntityStore for FlakyStore {
    fn drones(&self, filter: &DroneFilter) -> StoreResult<Vec<Drone>> {
        self.inner.drones(filter)
    }

    fn poles(&self, filter: &PoleFilter) -> StoreResult<Vec<Pole>> {
        if self.fail_pole_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected pole read failure".to_string()));
        }
        self.inner.poles(filter)
    }

    fn bases(&self, filter: &BaseFilter) -> StoreResult<Vec<Base>> {
        self.inner.bases(filter)
    }

    fn missions(&self, filter: &MissionFilter) -> StoreResult<Vec<Mission>> {
        self.inner.missions(filter)
    }

    fn update_drone(&self, id: EntityId, update: &DroneUpdate) -> StoreResult<Drone> {
        if update.position.is_some() && self.fail_positions.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected position write failure".to_string()));
        }
        if matches!(update.location, Some(DroneLocation::Pole(_)))
            && self.fail_next_install.swap(false, Ordering::SeqCst)
        {
            return Err(StoreError::Unavailable("injected install failure".to_string()));
        }
        self.inner.update_drone(id, update)
    }

    fn update_pole(&self, id: EntityId, update: &PoleUpdate) -> StoreResult<Pole> {
        self.inner.update_pole(id, update)
    }

    fn create_mission(&self, mission: &NewMission) -> StoreResult<Mission> {
        self.inner.create_mission(mission)
    }

    fn update_mission(&self, id: EntityId, update: &MissionUpdate) -> StoreResult<Mission> {
        self.inner.update_mission(id, update)
    }
}

impl SeedableStore for FlakyStore {
    fn insert_base(&self, base: &NewBase) -> StoreResult<Base> {
        self.inner.insert_base(base)
    }

    fn insert_pole(&self, pole: &NewPole) -> StoreResult<Pole> {
        self.inner.insert_pole(pole)
    }

    fn insert_drone(&self, drone: &NewDrone) -> StoreResult<Drone> {
        self.inner.insert_drone(drone)
    }
}
