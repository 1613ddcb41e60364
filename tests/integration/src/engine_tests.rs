//! Control loop lifecycle: start, steady state, stop and restart

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use luminafly_core::{MissionStatus, MissionType};
use luminafly_dispatch::ControlLoop;
use luminafly_store::{EntityStore, MissionFilter};

use crate::test_utils::*;

fn replacement_count(engine: &ControlLoop) -> usize {
    engine
        .store()
        .missions(&MissionFilter {
            mission_type: Some(MissionType::Replacement),
            ..MissionFilter::all()
        })
        .unwrap()
        .len()
}

/// At most one in-progress replacement per pole and one mission per drone
fn assert_exclusive(engine: &ControlLoop) {
    let missions = engine
        .store()
        .missions(&MissionFilter::in_progress())
        .unwrap();
    let mut per_pole: HashMap<i64, usize> = HashMap::new();
    let mut per_drone: HashMap<i64, usize> = HashMap::new();
    for mission in &missions {
        if mission.mission_type == MissionType::Replacement {
            if let Some(pole_id) = mission.pole_id {
                *per_pole.entry(pole_id).or_default() += 1;
            }
        }
        *per_drone.entry(mission.drone_id).or_default() += 1;
    }
    assert!(per_pole.values().all(|&n| n == 1), "pole repaired twice: {:?}", per_pole);
    assert!(per_drone.values().all(|&n| n == 1), "drone on two missions: {:?}", per_drone);
}

#[tokio::test(start_paused = true)]
async fn test_run_then_stop_leaves_nothing_behind() {
    let (engine, _fleet) = seeded_engine(21);
    let (_id, mut rx) = engine.broadcaster().subscribe_channel(100_000);

    assert!(engine.start());
    assert!(!engine.start());
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_exclusive(&engine);
    }
    assert!(engine.status().running);

    assert!(engine.stop().await);
    let status = engine.status();
    assert!(!status.running);
    assert_eq!(status.active_mission_count, 0);
    assert_eq!(status.observer_count, 0);

    let mut kinds = Vec::new();
    while let Some(frame) = rx.recv().await {
        let event: serde_json::Value = serde_json::from_str(&frame).unwrap();
        kinds.push(event["type"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds[0], "connected");
    assert_eq!(kinds[1], "all_lamps_working");
    assert!(kinds.iter().any(|k| k == "lamp_burned_out"));
    assert!(kinds.iter().any(|k| k == "drone_flying"));

    assert!(engine
        .store()
        .missions(&MissionFilter::in_progress())
        .unwrap()
        .is_empty());
    assert_eq!(engine.context().reservations.locked_poles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_in_flight_missions() {
    let (engine, _fleet) = seeded_engine(22);
    assert!(engine.start());

    // Run until some leg is airborne, then stop mid-flight
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

    let missions = engine.store().missions(&MissionFilter::all()).unwrap();
    assert!(missions.iter().all(|m| m.status != MissionStatus::InProgress));
    let failed: Vec<_> = missions
        .iter()
        .filter(|m| m.status == MissionStatus::Failed)
        .collect();
    assert!(!failed.is_empty());
    assert!(failed.iter().all(|m| m.failure_reason.is_some()));
    assert!(engine.status().pending_retries >= failed.len());
}

#[tokio::test(start_paused = true)]
async fn test_restart_recovers_and_keeps_exclusivity() {
    let (engine, _fleet) = seeded_engine(23);

    for _ in 0..3 {
        assert!(engine.start());
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(37)).await;
            assert_exclusive(&engine);
        }
        assert!(engine.stop().await);
        assert!(engine
            .store()
            .missions(&MissionFilter::in_progress())
            .unwrap()
            .is_empty());
    }
    assert!(!engine.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_departed_observer_is_pruned() {
    let (engine, _fleet) = seeded_engine(24);
    let (_stay, _rx) = engine.broadcaster().subscribe_channel(1);
    let (_leave, rx) = engine.broadcaster().subscribe_channel(1);
    drop(rx);

    assert!(engine.start());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.status().observer_count, 1);
    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_failing_ticks() {
    let store = Arc::new(FlakyStore::new());
    let (engine, fleet) = engine_over(Arc::clone(&store), 25);
    assert!(engine.start());

    // Every injector and dispatcher tick fails while pole reads are down
    store.fail_pole_reads(true);
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(engine.status().running);
    }
    assert_eq!(replacement_count(&engine), 0);

    store.fail_pole_reads(false);
    let pole = fleet.poles[5].id;
    engine.injector().burn_out(pole).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(engine.status().running);
    assert!(replacement_count(&engine) > 0);
    let for_pole = engine
        .store()
        .missions(&MissionFilter {
            pole_id: Some(pole),
            mission_type: Some(MissionType::Replacement),
            ..MissionFilter::all()
        })
        .unwrap();
    assert!(!for_pole.is_empty());

    assert!(engine.stop().await);
}
