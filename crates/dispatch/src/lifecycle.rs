//! Mission lifecycle: outbound repair legs, retirement and recovery flights.
//!
//! Every leg runs as a task on the engine's [`TaskTracker`] with a child of
//! the engine's cancellation token. A retirement flight is spawned by its
//! outbound leg on the same tracker with a grandchild token, so stopping the
//! engine cancels and awaits both.
//!
//! A leg that fails for any reason marks its mission failed and queues the
//! drone for recovery before its leases are released. Nothing is broadcast
//! for a leg after it failed. An arrival commit that fails after the pole was
//! written puts the pole back, so a failed repair never reads as a fixed lamp.

use std::sync::Arc;

use luminafly_core::{
    Coordinate, Drone, DroneLocation, DroneStatus, EntityId, FleetEvent, LampStatus, Pole,
};
use luminafly_store::{
    BaseFilter, DroneUpdate, EntityStore, MissionUpdate, NewMission, PoleUpdate, StoreError,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::animator::FlightAnimator;
use crate::context::FleetContext;
use crate::error::{FlightError, MissionError};
use crate::policy::ReturnBasePolicy;
use crate::reservations::Lease;
use crate::retry::RecoveryItem;

/// Tracker and cancellation root for the mission tasks of one engine run
#[derive(Debug, Clone, Default)]
pub struct MissionScope {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl MissionScope {
    /// Fresh scope with nothing running
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled by [`cancel`](Self::cancel)
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Tracker owning every mission task
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Signal every mission task to stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Mission tasks still running
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every mission task finished
    pub async fn close_and_wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Everything an outbound leg needs; built by the dispatcher
#[derive(Debug)]
pub struct OutboundOrder {
    /// Replacement mission, already in progress
    pub mission_id: EntityId,
    /// Drone as it was when allocated
    pub drone: Drone,
    /// Burned-out pole as it was when allocated
    pub pole: Pole,
    /// Repair lock on the pole
    pub pole_lease: Lease,
    /// Reservation on the drone
    pub drone_lease: Lease,
}

/// A flight home, either retiring a replaced drone or recovering a stranded one
#[derive(Debug)]
pub struct ReturnOrder {
    /// Drone flying home
    pub drone_id: EntityId,
    /// Recovery attempts before this flight; `None` for a retirement
    pub recovery_attempts: Option<u32>,
    /// Reservation on the drone
    pub lease: Lease,
}

/// What an outbound commit wrote
struct RepairCommit {
    pole: Pole,
    old_drone_id: Option<EntityId>,
}

/// Drives mission legs to completion or failure
#[derive(Clone)]
pub struct MissionRunner {
    ctx: FleetContext,
    animator: Arc<FlightAnimator>,
    return_policy: Arc<dyn ReturnBasePolicy>,
}

impl MissionRunner {
    /// Runner sharing `ctx` and flying with `animator`
    pub fn new(
        ctx: FleetContext,
        animator: Arc<FlightAnimator>,
        return_policy: Arc<dyn ReturnBasePolicy>,
    ) -> Self {
        Self {
            ctx,
            animator,
            return_policy,
        }
    }

    /// Run an outbound repair leg as a tracked task
    pub fn spawn_outbound(&self, scope: &MissionScope, order: OutboundOrder) {
        let runner = self.clone();
        let tracker = scope.tracker.clone();
        let cancel = scope.cancel.child_token();
        scope
            .tracker
            .spawn(async move { runner.run_outbound(order, tracker, cancel).await });
    }

    /// Run a recovery flight for a stranded drone as a tracked task
    pub fn spawn_recovery(&self, scope: &MissionScope, item: RecoveryItem, lease: Lease) {
        let runner = self.clone();
        let cancel = scope.cancel.child_token();
        scope
            .tracker
            .spawn(async move { runner.run_recovery(item, lease, cancel).await });
    }

    async fn run_outbound(self, order: OutboundOrder, tracker: TaskTracker, cancel: CancellationToken) {
        let OutboundOrder {
            mission_id,
            drone,
            pole,
            pole_lease,
            drone_lease,
        } = order;

        let commit = match self.fly_outbound(mission_id, &drone, &pole, &cancel).await {
            Ok(commit) => commit,
            Err(e) => {
                self.fail_leg(Some(mission_id), drone.id, &e, 0);
                return;
            }
        };
        drop(pole_lease);
        drop(drone_lease);

        info!(mission_id, drone_id = drone.id, pole_id = pole.id, "Lamp fixed");
        self.ctx.broadcaster.publish(&FleetEvent::LampFixed {
            pole_id: commit.pole.id,
            pole_name: commit.pole.name.clone(),
            drone_id: drone.id,
        });
        self.ctx.broadcaster.publish(&FleetEvent::DroneReplaced {
            new_drone_id: drone.id,
            old_drone_id: commit.old_drone_id,
            pole_id: commit.pole.id,
            pole_name: commit.pole.name,
        });

        let Some(old_drone_id) = commit.old_drone_id else {
            return;
        };
        let Some(lease) = self.ctx.reservations.reserve_drone(old_drone_id) else {
            let busy = MissionError::DroneBusy {
                drone_id: old_drone_id,
            };
            warn!(drone_id = old_drone_id, error = %busy, "Replaced drone not retired, queued for recovery");
            self.ctx
                .retries
                .push(RecoveryItem::new(old_drone_id, None, busy.to_string()));
            return;
        };
        let order = ReturnOrder {
            drone_id: old_drone_id,
            recovery_attempts: None,
            lease,
        };
        let retirement = cancel.child_token();
        let runner = self.clone();
        tracker.spawn(async move { runner.run_return(order, retirement).await });
    }

    async fn fly_outbound(
        &self,
        mission_id: EntityId,
        drone: &Drone,
        pole: &Pole,
        cancel: &CancellationToken,
    ) -> Result<RepairCommit, MissionError> {
        {
            let _guard = self.ctx.locks.drone(drone.id).await;
            ensure_live(cancel, drone.id, 0.0)?;
            self.ctx
                .store
                .update_drone(drone.id, &DroneUpdate::new().location(DroneLocation::InFlight))?;
        }

        debug!(mission_id, drone_id = drone.id, pole_id = pole.id, "Outbound leg airborne");
        self.animator
            .animate(drone.id, drone.position, pole.position, cancel)
            .await?;

        let _pole_guard = self.ctx.locks.pole(pole.id).await;
        let _drone_guard = self.ctx.locks.drone(drone.id).await;
        ensure_live(cancel, drone.id, 1.0)?;

        let current = self.ctx.store.pole(pole.id)?;
        let old_drone_id = current.drone_id.filter(|&id| id != drone.id);
        let fixed = self.ctx.store.update_pole(
            pole.id,
            &PoleUpdate::new()
                .lamp_status(LampStatus::Working)
                .drone_id(Some(drone.id)),
        )?;
        if let Err(e) = self.install(mission_id, drone.id, &fixed) {
            self.restore_pole(&current);
            return Err(e.into());
        }

        Ok(RepairCommit {
            pole: fixed,
            old_drone_id,
        })
    }

    /// Second half of the arrival commit. Caller holds the pole and drone locks.
    fn install(&self, mission_id: EntityId, drone_id: EntityId, pole: &Pole) -> Result<(), StoreError> {
        self.ctx.store.update_drone(
            drone_id,
            &DroneUpdate::new()
                .status(DroneStatus::Active)
                .location(DroneLocation::Pole(pole.id))
                .position(pole.position),
        )?;
        self.ctx
            .store
            .update_mission(mission_id, &MissionUpdate::completed())?;
        Ok(())
    }

    /// Put a pole back the way it was before a failed arrival commit, so the
    /// repair is retried and its old drone is still the installed one.
    fn restore_pole(&self, previous: &Pole) {
        let update = PoleUpdate::new()
            .lamp_status(previous.lamp_status)
            .drone_id(previous.drone_id);
        match self.ctx.store.update_pole(previous.id, &update) {
            Ok(_) => debug!(pole_id = previous.id, "Pole restored after failed repair commit"),
            Err(e) => error!(pole_id = previous.id, error = %e, "Failed to restore pole"),
        }
    }

    async fn run_recovery(self, item: RecoveryItem, lease: Lease, cancel: CancellationToken) {
        match self.settle_in_place(item.drone_id).await {
            Ok(true) => {
                debug!(drone_id = item.drone_id, "Drone no longer stranded");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                self.fail_leg(None, item.drone_id, &MissionError::from(e), item.attempts + 1);
                return;
            }
        }

        info!(
            drone_id = item.drone_id,
            attempt = item.attempts + 1,
            failed_mission_id = ?item.failed_mission_id,
            "Recovering stranded drone"
        );
        let order = ReturnOrder {
            drone_id: item.drone_id,
            recovery_attempts: Some(item.attempts),
            lease,
        };
        self.run_return(order, cancel).await;
    }

    /// Resolve drones that need no flight. Returns `true` when the drone is
    /// docked, installed on its pole, or out of service.
    async fn settle_in_place(&self, drone_id: EntityId) -> Result<bool, StoreError> {
        let _guard = self.ctx.locks.drone(drone_id).await;
        let drone = self.ctx.store.drone(drone_id)?;
        if matches!(drone.status, DroneStatus::Maintenance | DroneStatus::Inactive) {
            return Ok(true);
        }

        let settled = match drone.location {
            DroneLocation::Base(_) => true,
            DroneLocation::Pole(pole_id) => self.ctx.store.pole(pole_id)?.drone_id == Some(drone_id),
            DroneLocation::InFlight => false,
        };
        if settled && drone.status == DroneStatus::Flying {
            self.ctx
                .store
                .update_drone(drone_id, &DroneUpdate::new().status(DroneStatus::Active))?;
        }
        Ok(settled)
    }

    async fn run_return(self, order: ReturnOrder, cancel: CancellationToken) {
        let ReturnOrder {
            drone_id,
            recovery_attempts,
            lease: _lease,
        } = order;

        let mut mission_id = None;
        let result = self.fly_return(drone_id, &mut mission_id, &cancel).await;

        match result {
            Ok(()) => {
                info!(drone_id, mission_id = ?mission_id, "Drone back at base");
                self.ctx.broadcaster.publish(&FleetEvent::DroneReady { drone_id });
            }
            Err(e) => {
                let attempts = match recovery_attempts {
                    None => 0,
                    Some(n) if e.is_cancelled() => n,
                    Some(n) => n + 1,
                };
                self.fail_leg(mission_id, drone_id, &e, attempts);
            }
        }
    }

    async fn fly_return(
        &self,
        drone_id: EntityId,
        mission_id: &mut Option<EntityId>,
        cancel: &CancellationToken,
    ) -> Result<(), MissionError> {
        ensure_live(cancel, drone_id, 0.0)?;

        let drone = self.ctx.store.drone(drone_id)?;
        let bases = self.ctx.store.bases(&BaseFilter::all())?;
        let base = self
            .return_policy
            .choose(drone.position, &bases)
            .ok_or(MissionError::NoReturnBase { drone_id })?;
        let mission = self.ctx.store.create_mission(&NewMission::return_to_base(
            drone_id,
            drone.current_pole_id(),
            base.id,
        ))?;
        *mission_id = Some(mission.id);
        debug!(
            mission_id = mission.id,
            drone_id,
            base_id = base.id,
            policy = self.return_policy.name(),
            "Return leg started"
        );

        let from: Coordinate = drone.position;
        {
            let _guard = self.ctx.locks.drone(drone_id).await;
            ensure_live(cancel, drone_id, 0.0)?;
            self.ctx.store.update_drone(
                drone_id,
                &DroneUpdate::new()
                    .status(DroneStatus::Flying)
                    .location(DroneLocation::InFlight),
            )?;
        }

        self.animator.animate(drone_id, from, base.position, cancel).await?;

        let _guard = self.ctx.locks.drone(drone_id).await;
        ensure_live(cancel, drone_id, 1.0)?;
        self.ctx.store.update_drone(
            drone_id,
            &DroneUpdate::new()
                .status(DroneStatus::Active)
                .lamp_status(LampStatus::Working)
                .battery_level(100)
                .location(DroneLocation::Base(base.id))
                .position(base.position)
                .complete_mission(),
        )?;
        self.ctx
            .store
            .update_mission(mission.id, &MissionUpdate::completed())?;
        Ok(())
    }

    fn fail_leg(&self, mission_id: Option<EntityId>, drone_id: EntityId, err: &MissionError, attempts: u32) {
        let reason = err.to_string();
        if err.is_cancelled() {
            info!(mission_id = ?mission_id, drone_id, "Mission leg cancelled");
        } else {
            warn!(mission_id = ?mission_id, drone_id, error = %err, "Mission leg failed");
        }

        if let Some(id) = mission_id {
            if let Err(e) = self.ctx.store.update_mission(id, &MissionUpdate::failed(reason.clone())) {
                error!(mission_id = id, error = %e, "Failed to mark mission failed");
            }
        }

        self.ctx.retries.push(RecoveryItem {
            drone_id,
            failed_mission_id: mission_id,
            attempts,
            reason,
        });
    }
}

fn ensure_live(cancel: &CancellationToken, drone_id: EntityId, progress: f64) -> Result<(), FlightError> {
    if cancel.is_cancelled() {
        Err(FlightError::Cancelled { drone_id, progress })
    } else {
        Ok(())
    }
}
