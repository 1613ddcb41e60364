//! Matching burned-out poles with available drones.
//!
//! A tick first launches recovery flights for drones stranded by failed legs,
//! then walks every burned-out pole that is not already being repaired. For
//! each, the allocation policy ranks the available drones and the
//! reservation table atomically locks the pole, reserves the first free
//! drone and records the mission. The outbound leg then runs on its own task.

use luminafly_core::{DispatchConfig, Drone, DroneStatus, EntityId, FleetEvent, LampStatus, Mission, Pole};
use luminafly_store::{
    DroneFilter, DroneUpdate, EntityStore, MissionUpdate, NewMission, PoleFilter, StoreResult,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::context::FleetContext;
use crate::error::DispatchResult;
use crate::lifecycle::{MissionRunner, MissionScope, OutboundOrder};
use crate::policy::AllocationPolicy;
use crate::reservations::{Acquisition, RepairAssignment};

/// Summary of one dispatcher tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Replacement missions started
    pub dispatched: usize,
    /// Burned-out poles already under repair
    pub skipped_locked: usize,
    /// Burned-out poles left waiting for a drone
    pub unassigned: usize,
    /// Recovery flights started
    pub recovered: usize,
}

/// Result of trying to dispatch one pole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A drone is on its way
    Dispatched {
        /// Replacement mission
        mission_id: EntityId,
        /// Drone flying it
        drone_id: EntityId,
    },
    /// The pole is already being repaired
    PoleLocked,
    /// No drone is available
    NoDrone,
    /// The pole was repaired since it was read
    AlreadyWorking,
}

/// Allocates drones to burned-out poles
pub struct Dispatcher {
    ctx: FleetContext,
    runner: MissionRunner,
    policy: Box<dyn AllocationPolicy>,
    min_battery: u8,
    max_recovery_attempts: u32,
}

impl Dispatcher {
    /// Dispatcher handing legs to `runner`
    pub fn new(
        ctx: FleetContext,
        runner: MissionRunner,
        policy: Box<dyn AllocationPolicy>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            ctx,
            runner,
            policy,
            min_battery: config.min_battery,
            max_recovery_attempts: config.max_recovery_attempts,
        }
    }

    /// One allocation pass over every burned-out pole.
    ///
    /// Store errors abort the pass; poles not reached are retried next tick.
    pub fn tick(&self, scope: &MissionScope) -> DispatchResult<DispatchReport> {
        let mut report = DispatchReport {
            recovered: self.drain_retries(scope),
            ..DispatchReport::default()
        };

        for pole in self.ctx.store.poles(&PoleFilter::burned_out())? {
            if self.ctx.reservations.is_pole_locked(pole.id) {
                report.skipped_locked += 1;
                continue;
            }
            match self.dispatch_pole(scope, &pole)? {
                DispatchOutcome::Dispatched { .. } => report.dispatched += 1,
                DispatchOutcome::PoleLocked => report.skipped_locked += 1,
                DispatchOutcome::NoDrone => report.unassigned += 1,
                DispatchOutcome::AlreadyWorking => {}
            }
        }

        if report.unassigned > 0 {
            debug!(unassigned = report.unassigned, "No available drone for some poles");
        }
        Ok(report)
    }

    /// Try to start a repair of `pole`.
    pub fn dispatch_pole(&self, scope: &MissionScope, pole: &Pole) -> DispatchResult<DispatchOutcome> {
        let candidates = self.ctx.store.drones(&DroneFilter::available(self.min_battery))?;
        let ranked = self.policy.rank(pole, candidates);

        let mut repaired = false;
        let acquisition = self.ctx.reservations.acquire_repair(pole.id, ranked, |candidate| {
            self.record_mission(candidate.id, pole.id, &mut repaired)
        })?;

        let RepairAssignment {
            pole_lease,
            drone_lease,
            value: (mission, drone),
            ..
        } = match acquisition {
            Acquisition::Acquired(assignment) => assignment,
            Acquisition::PoleLocked => return Ok(DispatchOutcome::PoleLocked),
            Acquisition::NoDrone if repaired => return Ok(DispatchOutcome::AlreadyWorking),
            Acquisition::NoDrone => return Ok(DispatchOutcome::NoDrone),
        };

        info!(
            mission_id = mission.id,
            drone_id = drone.id,
            pole_id = pole.id,
            policy = self.policy.name(),
            "Dispatching drone"
        );
        self.ctx.broadcaster.publish(&FleetEvent::DroneFlying {
            drone_id: drone.id,
            target: pole.name.clone(),
        });

        let outcome = DispatchOutcome::Dispatched {
            mission_id: mission.id,
            drone_id: drone.id,
        };
        self.runner.spawn_outbound(
            scope,
            OutboundOrder {
                mission_id: mission.id,
                drone,
                pole: pole.clone(),
                pole_lease,
                drone_lease,
            },
        );
        Ok(outcome)
    }

    /// Create the replacement mission and mark the drone flying.
    ///
    /// Runs under the reservation table. Both records are re-read first, so a
    /// candidate or pole that changed since the tick's snapshot is skipped.
    fn record_mission(
        &self,
        drone_id: EntityId,
        pole_id: EntityId,
        repaired: &mut bool,
    ) -> StoreResult<Option<(Mission, Drone)>> {
        if *repaired {
            return Ok(None);
        }
        if self.ctx.store.pole(pole_id)?.lamp_status != LampStatus::BurnedOut {
            *repaired = true;
            return Ok(None);
        }
        let drone = self.ctx.store.drone(drone_id)?;
        if !drone.is_available(self.min_battery) {
            debug!(drone_id, "Candidate no longer available");
            return Ok(None);
        }

        let mission = self.ctx.store.create_mission(&NewMission::replacement(
            drone_id,
            pole_id,
            drone.current_base_id(),
        ))?;
        if let Err(e) = self
            .ctx
            .store
            .update_drone(drone_id, &DroneUpdate::new().status(DroneStatus::Flying))
        {
            if let Err(fail) = self
                .ctx
                .store
                .update_mission(mission.id, &MissionUpdate::failed(e.to_string()))
            {
                error!(mission_id = mission.id, error = %fail, "Failed to mark mission failed");
            }
            return Err(e);
        }
        Ok(Some((mission, drone)))
    }

    /// Launch recovery flights; returns how many started.
    fn drain_retries(&self, scope: &MissionScope) -> usize {
        let mut launched = 0;
        for item in self.ctx.retries.drain() {
            if item.attempts >= self.max_recovery_attempts {
                warn!(
                    drone_id = item.drone_id,
                    attempts = item.attempts,
                    reason = %item.reason,
                    "Recovery attempts exhausted, drone sent to maintenance"
                );
                if let Err(e) = self
                    .ctx
                    .store
                    .update_drone(item.drone_id, &DroneUpdate::new().status(DroneStatus::Maintenance))
                {
                    error!(drone_id = item.drone_id, error = %e, "Failed to retire drone to maintenance");
                }
                continue;
            }

            let Some(lease) = self.ctx.reservations.reserve_drone(item.drone_id) else {
                self.ctx.retries.push(item);
                continue;
            };
            self.runner.spawn_recovery(scope, item, lease);
            launched += 1;
        }
        launched
    }
}
