//! Drones stranded by failed legs are flown home or retired

use std::sync::Arc;
use std::time::Duration;

use luminafly_core::{DroneLocation, DroneStatus, LampStatus, MissionStatus, MissionType};
use luminafly_dispatch::{MissionScope, RecoveryItem};
use luminafly_store::{DroneFilter, DroneUpdate, EntityStore, MissionFilter};

use crate::test_utils::*;

#[tokio::test(start_paused = true)]
async fn test_failed_outbound_is_recovered_and_pole_redispatched() {
    let store = Arc::new(FlakyStore::new());
    let (engine, fleet) = engine_over(Arc::clone(&store), 31);
    let ctx = engine.context();
    let pole = &fleet.poles[10];
    let stranded = fleet.reserves[0].id;
    assert!(engine.injector().burn_out(pole.id).await.unwrap());

    store.fail_position_writes(true);
    let scope = MissionScope::new();
    assert_eq!(engine.dispatcher().tick(&scope).unwrap().dispatched, 1);
    scope.close_and_wait().await;

    let missions = store.missions(&MissionFilter::all()).unwrap();
    assert_eq!(missions.len(), 1);
    assert_eq!(missions[0].status, MissionStatus::Failed);
    assert!(missions[0]
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("injected")));
    assert!(ctx.retries.contains(stranded));
    assert!(!ctx.reservations.is_pole_locked(pole.id));
    assert!(!ctx.reservations.is_drone_reserved(stranded));
    assert_eq!(store.pole(pole.id).unwrap().lamp_status, LampStatus::BurnedOut);
    let drone = store.drone(stranded).unwrap();
    assert_eq!(drone.status, DroneStatus::Flying);
    assert_eq!(drone.location, DroneLocation::InFlight);

    store.fail_position_writes(false);
    let scope = MissionScope::new();
    let report = engine.dispatcher().tick(&scope).unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.dispatched, 1);
    scope.close_and_wait().await;

    let home = store.drone(stranded).unwrap();
    assert_eq!(home.status, DroneStatus::Active);
    assert_eq!(home.location, DroneLocation::Base(fleet.bases[0].id));
    assert_eq!(home.battery_level, 100);
    assert_eq!(home.total_missions, 1);

    let pole = store.pole(pole.id).unwrap();
    assert_eq!(pole.lamp_status, LampStatus::Working);
    assert_eq!(pole.drone_id, Some(fleet.reserves[1].id));
    assert!(ctx.retries.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_install_restores_pole_for_old_drone() {
    let store = Arc::new(FlakyStore::new());
    let (engine, fleet) = engine_over(Arc::clone(&store), 34);
    let ctx = engine.context();
    let pole = &fleet.poles[10];
    let old = store.pole(pole.id).unwrap().drone_id.unwrap();
    let stranded = fleet.reserves[0].id;
    assert!(engine.injector().burn_out(pole.id).await.unwrap());

    store.fail_next_install();
    let scope = MissionScope::new();
    assert_eq!(engine.dispatcher().tick(&scope).unwrap().dispatched, 1);
    scope.close_and_wait().await;

    let restored = store.pole(pole.id).unwrap();
    assert_eq!(restored.lamp_status, LampStatus::BurnedOut);
    assert_eq!(restored.drone_id, Some(old));
    let installed = store.drone(old).unwrap();
    assert_eq!(installed.location, DroneLocation::Pole(pole.id));
    assert_eq!(installed.lamp_status, LampStatus::BurnedOut);

    let missions = store.missions(&MissionFilter::all()).unwrap();
    assert_eq!(missions.len(), 1);
    assert_eq!(missions[0].drone_id, stranded);
    assert_eq!(missions[0].status, MissionStatus::Failed);
    assert!(missions[0]
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("injected")));
    assert!(ctx.retries.contains(stranded));
    assert!(!ctx.retries.contains(old));
    assert!(!ctx.reservations.is_pole_locked(pole.id));
    assert_eq!(store.drone(stranded).unwrap().location, DroneLocation::InFlight);

    let scope = MissionScope::new();
    let report = engine.dispatcher().tick(&scope).unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.dispatched, 1);
    scope.close_and_wait().await;

    let home = store.drone(stranded).unwrap();
    assert_eq!(home.status, DroneStatus::Active);
    assert_eq!(home.location, DroneLocation::Base(fleet.bases[0].id));

    let repaired = store.pole(pole.id).unwrap();
    assert_eq!(repaired.lamp_status, LampStatus::Working);
    let new = repaired.drone_id.unwrap();
    assert_ne!(new, old);
    assert_ne!(new, stranded);
    assert_eq!(store.drone(new).unwrap().location, DroneLocation::Pole(pole.id));

    let retired = store.drone(old).unwrap();
    assert_eq!(retired.location, DroneLocation::Base(fleet.bases[0].id));
    assert_eq!(retired.lamp_status, LampStatus::Working);
    assert!(ctx.retries.is_empty());
    assert!(store
        .missions(&MissionFilter::in_progress())
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_recovery_retires_drone_to_maintenance() {
    let store = Arc::new(FlakyStore::new());
    let (engine, fleet) = engine_over(Arc::clone(&store), 32);
    let ctx = engine.context();
    let drone = fleet.reserves[2].id;
    store
        .update_drone(
            drone,
            &DroneUpdate::new()
                .status(DroneStatus::Flying)
                .location(DroneLocation::InFlight),
        )
        .unwrap();
    ctx.retries.push(RecoveryItem::new(drone, None, "lost link"));

    store.fail_position_writes(true);
    for attempt in 1..=3 {
        let scope = MissionScope::new();
        assert_eq!(engine.dispatcher().tick(&scope).unwrap().recovered, 1);
        scope.close_and_wait().await;

        let items = ctx.retries.drain();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].drone_id, drone);
        assert_eq!(items[0].attempts, attempt);
        assert!(items[0].failed_mission_id.is_some());
        ctx.retries.push(items[0].clone());
    }

    let scope = MissionScope::new();
    assert_eq!(engine.dispatcher().tick(&scope).unwrap().recovered, 0);
    scope.close_and_wait().await;

    assert!(ctx.retries.is_empty());
    assert_eq!(store.drone(drone).unwrap().status, DroneStatus::Maintenance);
    let returns = store
        .missions(&MissionFilter {
            drone_id: Some(drone),
            mission_type: Some(MissionType::Return),
            ..MissionFilter::all()
        })
        .unwrap();
    assert_eq!(returns.len(), 3);
    assert!(returns.iter().all(|m| m.status == MissionStatus::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_legs_cancelled_by_stop_are_recovered_afterwards() {
    let (engine, _fleet) = seeded_engine(33);
    assert!(engine.start());
    let mut airborne = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if engine.status().active_mission_count > 0 {
            airborne = true;
            break;
        }
    }
    assert!(airborne);
    assert!(engine.stop().await);
    let stranded = engine.status().pending_retries;
    assert!(stranded > 0);

    // Cancellation is not a failed attempt
    let items = engine.context().retries.drain();
    assert!(items.iter().all(|i| i.attempts == 0));
    for item in items {
        engine.context().retries.push(item);
    }

    let scope = MissionScope::new();
    let report = engine.dispatcher().tick(&scope).unwrap();
    assert_eq!(report.recovered, stranded);
    scope.close_and_wait().await;

    assert!(engine.context().retries.is_empty());
    let drones = engine.store().drones(&DroneFilter::all()).unwrap();
    assert!(drones.iter().all(|d| d.status != DroneStatus::Flying));
    assert!(drones.iter().all(|d| d.location != DroneLocation::InFlight));
    assert!(engine
        .store()
        .missions(&MissionFilter::in_progress())
        .unwrap()
        .is_empty());
}
