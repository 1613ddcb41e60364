//! Top-level scheduler of the dispatch engine.
//!
//! The control loop sleeps a random interval, burns out some lamps and runs
//! one dispatcher pass, then repeats until stopped. Ticks are sequential;
//! missions started by a tick keep flying across later ticks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use luminafly_core::{Config, DroneStatus, FleetEvent, LampStatus, SimulationConfig};
use luminafly_store::{DroneFilter, DroneUpdate, EntityStore, PoleFilter, PoleUpdate};
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::animator::FlightAnimator;
use crate::broadcaster::EventBroadcaster;
use crate::context::FleetContext;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchResult;
use crate::injector::FailureInjector;
use crate::lifecycle::{MissionRunner, MissionScope};
use crate::policy::{allocation_policy, return_base_policy};
use crate::rng::SimRng;

/// Snapshot returned by [`ControlLoop::status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// Whether the loop is running
    pub running: bool,
    /// Mission tasks in flight
    pub active_mission_count: usize,
    /// Connected observers
    pub observer_count: usize,
    /// Drones waiting for a recovery flight
    pub pending_retries: usize,
}

struct Running {
    scope: MissionScope,
    handle: JoinHandle<()>,
}

/// Owns every engine component and the start/stop lifecycle
pub struct ControlLoop {
    ctx: FleetContext,
    dispatcher: Arc<Dispatcher>,
    injector: Arc<FailureInjector>,
    rng: SimRng,
    simulation: SimulationConfig,
    running: Mutex<Option<Running>>,
}

impl ControlLoop {
    /// Wire an engine around `store` from `config`
    pub fn new(store: Arc<dyn EntityStore>, config: &Config) -> Self {
        let ctx = FleetContext::new(store);
        let rng = SimRng::new(config.simulation.seed);

        let animator = Arc::new(FlightAnimator::new(ctx.clone(), &config.flight));
        let runner = MissionRunner::new(
            ctx.clone(),
            animator,
            Arc::from(return_base_policy(config.dispatch.return_base)),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            ctx.clone(),
            runner,
            allocation_policy(config.dispatch.allocation),
            &config.dispatch,
        ));
        let injector = Arc::new(FailureInjector::new(
            ctx.clone(),
            rng.clone(),
            config.simulation.burn_per_tick,
        ));

        Self {
            ctx,
            dispatcher,
            injector,
            rng,
            simulation: config.simulation.clone(),
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Observer fan-out
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.ctx.broadcaster
    }

    /// Entity store
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.ctx.store
    }

    /// Shared engine state
    pub fn context(&self) -> &FleetContext {
        &self.ctx
    }

    /// Allocator used by each tick
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Failure source used by each tick
    pub fn injector(&self) -> &Arc<FailureInjector> {
        &self.injector
    }

    /// Start ticking. Returns `false` if the loop was already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running();
        if running.is_some() {
            debug!("Control loop already running");
            return false;
        }

        if self.simulation.reset_on_start {
            if let Err(e) = self.reset_lamps() {
                error!(error = %e, "Failed to reset lamps on start");
            }
        }

        let scope = MissionScope::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.injector),
            self.rng.clone(),
            self.simulation.clone(),
            scope.clone(),
        ));
        *running = Some(Running { scope, handle });

        info!(
            interval_min_ms = self.simulation.interval_min_ms,
            interval_max_ms = self.simulation.interval_max_ms,
            "Control loop started"
        );
        true
    }

    /// Cancel the loop and every mission, wait for them, then release all
    /// reservations and disconnect observers. Returns `false` if not running.
    pub async fn stop(&self) -> bool {
        let taken = self.running().take();
        let Some(Running { scope, handle }) = taken else {
            return false;
        };

        scope.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Control loop task ended abnormally");
        }
        scope.close_and_wait().await;

        let released = self.ctx.reservations.clear();
        let disconnected = self.ctx.broadcaster.disconnect_all();
        info!(
            released,
            disconnected,
            pending_retries = self.ctx.retries.len(),
            "Control loop stopped"
        );
        true
    }

    /// Current engine snapshot
    pub fn status(&self) -> EngineStatus {
        let active_mission_count = self.running().as_ref().map_or(0, |r| r.scope.active());
        EngineStatus {
            running: self.is_running(),
            active_mission_count,
            observer_count: self.ctx.broadcaster.observer_count(),
            pending_retries: self.ctx.retries.len(),
        }
    }

    /// Whether the loop is running
    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Set every lamp to working and announce it.
    fn reset_lamps(&self) -> DispatchResult<()> {
        let store = &self.ctx.store;
        for pole in store.poles(&PoleFilter::all())? {
            if pole.lamp_status != LampStatus::Working {
                store.update_pole(pole.id, &PoleUpdate::new().lamp_status(LampStatus::Working))?;
            }
        }
        for drone in store.drones(&DroneFilter::all())? {
            if drone.lamp_status != LampStatus::Working && drone.status != DroneStatus::Inactive {
                store.update_drone(drone.id, &DroneUpdate::new().lamp_status(LampStatus::Working))?;
            }
        }
        self.ctx.broadcaster.publish(&FleetEvent::AllLampsWorking {});
        info!("All lamps reset to working");
        Ok(())
    }
}

async fn run_loop(
    dispatcher: Arc<Dispatcher>,
    injector: Arc<FailureInjector>,
    rng: SimRng,
    simulation: SimulationConfig,
    scope: MissionScope,
) {
    let mut ticks: u64 = 0;
    loop {
        let delay = rng.with(|r| r.gen_range(simulation.interval_min_ms..=simulation.interval_max_ms));
        tokio::select! {
            _ = scope.token().cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
        }
        ticks += 1;

        if let Err(e) = injector.tick().await {
            error!(tick = ticks, error = %e, "Failure injection tick failed");
        }
        if scope.is_cancelled() {
            break;
        }
        match dispatcher.tick(&scope) {
            Ok(report) => debug!(
                tick = ticks,
                dispatched = report.dispatched,
                skipped_locked = report.skipped_locked,
                unassigned = report.unassigned,
                recovered = report.recovered,
                "Dispatch tick"
            ),
            Err(e) => error!(tick = ticks, error = %e, "Dispatch tick failed"),
        }
    }
    debug!(ticks, "Control loop exited");
}
