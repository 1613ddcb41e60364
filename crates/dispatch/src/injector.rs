//! Random lamp failures.

use luminafly_core::{EntityId, FleetEvent, LampStatus, Pole};
use luminafly_store::{DroneUpdate, EntityStore, PoleFilter, PoleUpdate};
use rand::seq::SliceRandom;
use tracing::{debug, info, trace};

use crate::context::FleetContext;
use crate::error::DispatchResult;
use crate::rng::SimRng;

/// Burns out lamps on working poles
pub struct FailureInjector {
    ctx: FleetContext,
    rng: SimRng,
    burn_per_tick: usize,
}

impl FailureInjector {
    /// Injector burning at most `burn_per_tick` poles per tick
    pub fn new(ctx: FleetContext, rng: SimRng, burn_per_tick: usize) -> Self {
        Self {
            ctx,
            rng,
            burn_per_tick,
        }
    }

    /// Burn out a uniform sample of working poles that have a drone installed.
    ///
    /// Returns the ids of the poles that changed state.
    pub async fn tick(&self) -> DispatchResult<Vec<EntityId>> {
        let eligible = self.ctx.store.poles(&PoleFilter::working_with_drone())?;
        if eligible.is_empty() {
            trace!("No working poles to burn out");
            return Ok(Vec::new());
        }

        let chosen: Vec<EntityId> = self.rng.with(|rng| {
            eligible
                .choose_multiple(rng, self.burn_per_tick)
                .map(|p: &Pole| p.id)
                .collect()
        });

        let mut burned = Vec::with_capacity(chosen.len());
        for pole_id in chosen {
            if self.burn_out(pole_id).await? {
                burned.push(pole_id);
            }
        }
        debug!(eligible = eligible.len(), burned = burned.len(), "Failure injection tick");
        Ok(burned)
    }

    /// Burn out one pole's lamp and the lamp of its installed drone.
    ///
    /// Returns `false` without touching anything if the pole is not working.
    pub async fn burn_out(&self, pole_id: EntityId) -> DispatchResult<bool> {
        let _pole_guard = self.ctx.locks.pole(pole_id).await;
        let pole = self.ctx.store.pole(pole_id)?;
        if pole.lamp_status != LampStatus::Working {
            return Ok(false);
        }

        let pole = self
            .ctx
            .store
            .update_pole(pole_id, &PoleUpdate::new().lamp_status(LampStatus::BurnedOut))?;
        if let Some(drone_id) = pole.drone_id {
            let _drone_guard = self.ctx.locks.drone(drone_id).await;
            self.ctx
                .store
                .update_drone(drone_id, &DroneUpdate::new().lamp_status(LampStatus::BurnedOut))?;
        }

        info!(pole_id, pole_name = %pole.name, drone_id = ?pole.drone_id, "Lamp burned out");
        self.ctx.broadcaster.publish(&FleetEvent::LampBurnedOut {
            pole_id,
            pole_name: pole.name,
        });
        Ok(true)
    }
}
