//! Repair scenarios driven tick by tick

use std::sync::Arc;

use luminafly_core::{DroneLocation, DroneStatus, EntityId, LampStatus, MissionStatus, MissionType};
use luminafly_dispatch::{ControlLoop, EventBroadcaster, MissionScope};
use luminafly_store::seed::SeededFleet;
use luminafly_store::{DroneUpdate, EntityStore, MissionFilter, SqliteEntityStore};

use crate::test_utils::*;

fn is_drone(id: EntityId) -> impl Fn(&serde_json::Value) -> bool {
    move |d| d["drone_id"] == id
}

async fn single_repair_and_retirement(engine: ControlLoop, fleet: SeededFleet) {
    let store = engine.store();
    let pole = &fleet.poles[0];
    let old = fleet.installed[0].id;
    let replacement = fleet.reserves[0].id;
    store
        .update_drone(old, &DroneUpdate::new().battery_level(40))
        .unwrap();

    let (_id, mut rx) = engine
        .broadcaster()
        .subscribe_channel(EventBroadcaster::DEFAULT_CHANNEL_CAPACITY);

    assert!(engine.injector().burn_out(pole.id).await.unwrap());
    let scope = MissionScope::new();
    let report = engine.dispatcher().tick(&scope).unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.unassigned, 0);
    scope.close_and_wait().await;

    let events = drain_events(&mut rx);
    let burned = position_of(&events, "lamp_burned_out", |d| d["pole_id"] == pole.id).unwrap();
    let flying = position_of(&events, "drone_flying", is_drone(replacement)).unwrap();
    let fixed = position_of(&events, "lamp_fixed", is_drone(replacement)).unwrap();
    let replaced = position_of(&events, "drone_replaced", |d| {
        d["new_drone_id"] == replacement && d["old_drone_id"] == old
    })
    .unwrap();
    let ready = position_of(&events, "drone_ready", is_drone(old)).unwrap();
    assert!(burned < flying);
    assert!(flying < fixed);
    assert!(fixed < replaced);
    assert!(replaced < ready);

    let pole = store.pole(pole.id).unwrap();
    assert_eq!(pole.lamp_status, LampStatus::Working);
    assert_eq!(pole.drone_id, Some(replacement));

    let installed = store.drone(replacement).unwrap();
    assert_eq!(installed.status, DroneStatus::Active);
    assert_eq!(installed.location, DroneLocation::Pole(pole.id));
    assert_eq!(installed.position, pole.position);

    let retired = store.drone(old).unwrap();
    assert_eq!(retired.status, DroneStatus::Active);
    assert_eq!(retired.battery_level, 100);
    assert_eq!(retired.lamp_status, LampStatus::Working);
    assert_eq!(retired.location, DroneLocation::Base(fleet.bases[0].id));
    assert_eq!(retired.position, fleet.bases[0].position);
    assert_eq!(retired.total_missions, 1);

    let missions = store.missions(&MissionFilter::all()).unwrap();
    assert_eq!(missions.len(), 2);
    assert!(missions.iter().all(|m| m.status == MissionStatus::Completed));
    let ret = missions
        .iter()
        .find(|m| m.mission_type == MissionType::Return)
        .unwrap();
    assert_eq!(ret.drone_id, old);
    assert_eq!(ret.to_base_id, Some(fleet.bases[0].id));
}

#[tokio::test(start_paused = true)]
async fn test_single_repair_in_memory() {
    let (engine, fleet) = seeded_engine(1);
    single_repair_and_retirement(engine, fleet).await;
}

#[tokio::test(start_paused = true)]
async fn test_single_repair_sqlite() {
    let store = Arc::new(SqliteEntityStore::open_in_memory().unwrap());
    let (engine, fleet) = engine_over(store, 1);
    single_repair_and_retirement(engine, fleet).await;
}

#[tokio::test(start_paused = true)]
async fn test_low_battery_fleet_leaves_pole_waiting() {
    let (engine, fleet) = seeded_engine(2);
    let store = engine.store();
    for drone in &fleet.reserves {
        store
            .update_drone(drone.id, &DroneUpdate::new().battery_level(10))
            .unwrap();
    }
    let pole = &fleet.poles[6];
    assert!(engine.injector().burn_out(pole.id).await.unwrap());

    let scope = MissionScope::new();
    for _ in 0..3 {
        let report = engine.dispatcher().tick(&scope).unwrap();
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.unassigned, 1);
    }
    assert!(store.missions(&MissionFilter::all()).unwrap().is_empty());
    assert_eq!(store.pole(pole.id).unwrap().lamp_status, LampStatus::BurnedOut);
    assert!(!engine.context().reservations.is_pole_locked(pole.id));

    let charged = fleet.reserves[3].id;
    store
        .update_drone(charged, &DroneUpdate::new().battery_level(80))
        .unwrap();
    let report = engine.dispatcher().tick(&scope).unwrap();
    assert_eq!(report.dispatched, 1);
    scope.close_and_wait().await;

    let pole = store.pole(pole.id).unwrap();
    assert_eq!(pole.lamp_status, LampStatus::Working);
    assert_eq!(pole.drone_id, Some(charged));
}

#[tokio::test(start_paused = true)]
async fn test_retired_drone_serves_the_next_pole() {
    let (engine, fleet) = seeded_engine(3);
    let store = engine.store();
    ground_reserves(&engine, &fleet, 1);

    let first = &fleet.poles[0];
    let second = &fleet.poles[1];
    assert!(engine.injector().burn_out(first.id).await.unwrap());
    assert!(engine.injector().burn_out(second.id).await.unwrap());

    let scope = MissionScope::new();
    let report = engine.dispatcher().tick(&scope).unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.unassigned, 1);
    scope.close_and_wait().await;

    let retired = fleet.installed[0].id;
    let docked = store.drone(retired).unwrap();
    assert_eq!(docked.location, DroneLocation::Base(fleet.bases[0].id));
    assert_eq!(store.pole(first.id).unwrap().drone_id, Some(fleet.reserves[0].id));
    assert_eq!(store.pole(second.id).unwrap().lamp_status, LampStatus::BurnedOut);

    let scope = MissionScope::new();
    let report = engine.dispatcher().tick(&scope).unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.unassigned, 0);
    let outbound = in_progress_for_drone(store.as_ref(), retired);
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].pole_id, Some(second.id));
    scope.close_and_wait().await;

    let second = store.pole(second.id).unwrap();
    assert_eq!(second.lamp_status, LampStatus::Working);
    assert_eq!(second.drone_id, Some(retired));
    assert_eq!(
        store.drone(fleet.installed[1].id).unwrap().location,
        DroneLocation::Base(fleet.bases[0].id)
    );
}
