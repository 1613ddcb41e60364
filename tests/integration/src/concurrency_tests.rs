//! Mutual exclusion under concurrent dispatch and failure injection

use std::collections::HashMap;
use std::sync::Arc;

use luminafly_core::{LampStatus, MissionStatus, MissionType};
use luminafly_dispatch::{DispatchOutcome, MissionScope};
use luminafly_store::{EntityStore, MissionFilter};
use tokio::sync::Barrier;

use crate::test_utils::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_repairs_pole_once() {
    let (engine, fleet) = seeded_engine(11);
    let pole = fleet.poles[8].clone();
    assert!(engine.injector().burn_out(pole.id).await.unwrap());

    let scope = MissionScope::new();
    let barrier = Arc::new(Barrier::new(16));
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let dispatcher = Arc::clone(engine.dispatcher());
            let barrier = Arc::clone(&barrier);
            let scope = scope.clone();
            let pole = pole.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                dispatcher.dispatch_pole(&scope, &pole).unwrap()
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap());
    }
    let dispatched = outcomes
        .iter()
        .filter(|o| matches!(o, DispatchOutcome::Dispatched { .. }))
        .count();
    assert_eq!(dispatched, 1);
    assert!(outcomes.iter().all(|o| matches!(
        o,
        DispatchOutcome::Dispatched { .. } | DispatchOutcome::PoleLocked | DispatchOutcome::AlreadyWorking
    )));

    let missions = engine
        .store()
        .missions(&MissionFilter {
            pole_id: Some(pole.id),
            ..MissionFilter::all()
        })
        .unwrap();
    assert_eq!(missions.len(), 1);

    scope.close_and_wait().await;
    assert_eq!(engine.store().pole(pole.id).unwrap().lamp_status, LampStatus::Working);
    assert_eq!(engine.context().reservations.locked_poles(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drone_flies_one_mission_at_a_time() {
    let (engine, fleet) = seeded_engine(12);
    ground_reserves(&engine, &fleet, 3);
    let poles: Vec<_> = fleet.poles[4..12].to_vec();
    for pole in &poles {
        assert!(engine.injector().burn_out(pole.id).await.unwrap());
    }

    let scope = MissionScope::new();
    let barrier = Arc::new(Barrier::new(poles.len()));
    let tasks: Vec<_> = poles
        .iter()
        .cloned()
        .map(|pole| {
            let dispatcher = Arc::clone(engine.dispatcher());
            let barrier = Arc::clone(&barrier);
            let scope = scope.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                dispatcher.dispatch_pole(&scope, &pole).unwrap()
            })
        })
        .collect();

    let mut per_drone: HashMap<i64, usize> = HashMap::new();
    for task in tasks {
        if let DispatchOutcome::Dispatched { drone_id, .. } = task.await.unwrap() {
            *per_drone.entry(drone_id).or_default() += 1;
        }
    }
    assert!(!per_drone.is_empty());
    assert!(per_drone.len() <= 3);
    for reserve in &fleet.reserves[..3] {
        assert!(in_progress_for_drone(engine.store().as_ref(), reserve.id).len() <= 1);
    }

    scope.close_and_wait().await;

    let replacements = engine
        .store()
        .missions(&MissionFilter {
            mission_type: Some(MissionType::Replacement),
            ..MissionFilter::all()
        })
        .unwrap();
    assert_eq!(replacements.len(), per_drone.values().sum::<usize>());
    assert!(replacements.iter().all(|m| m.status == MissionStatus::Completed));
    let mut drones: Vec<_> = replacements.iter().map(|m| m.drone_id).collect();
    drones.sort_unstable();
    drones.dedup();
    assert_eq!(drones.len(), replacements.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_burn_out_is_idempotent() {
    let (engine, fleet) = seeded_engine(13);
    let pole = fleet.poles[1].id;
    let (_id, mut rx) = engine.broadcaster().subscribe_channel(64);

    let barrier = Arc::new(Barrier::new(8));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let injector = Arc::clone(engine.injector());
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                injector.burn_out(pole).await.unwrap()
            })
        })
        .collect();

    let mut burned = 0;
    for task in tasks {
        if task.await.unwrap() {
            burned += 1;
        }
    }
    assert_eq!(burned, 1);

    let events = drain_events(&mut rx);
    let announced = events
        .iter()
        .filter(|e| e["type"] == "lamp_burned_out")
        .count();
    assert_eq!(announced, 1);
    assert_eq!(engine.store().pole(pole).unwrap().lamp_status, LampStatus::BurnedOut);
}
