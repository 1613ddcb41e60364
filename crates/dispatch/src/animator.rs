//! Time-stepped flight animation.
//!
//! A leg is split into `steps` equal fractions. Every waypoint is persisted
//! and broadcast, then the animator sleeps `duration / steps` before the next
//! one. The final waypoint is the destination itself and is not followed by
//! a sleep.

use std::iter::FusedIterator;
use std::time::Duration;

use luminafly_core::{Coordinate, EntityId, FleetEvent, FlightConfig};
use luminafly_store::{DroneUpdate, EntityStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::context::FleetContext;
use crate::error::FlightError;

/// One point of a flight path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    /// Step index, `0..=steps`
    pub step: u32,
    /// Fraction of the leg, `step / steps`
    pub progress: f64,
    /// Interpolated position
    pub position: Coordinate,
}

/// Lazy sequence of `steps + 1` waypoints from `from` to `to`
#[derive(Debug, Clone)]
pub struct FlightPath {
    from: Coordinate,
    to: Coordinate,
    steps: u32,
    next: u32,
}

/// Waypoints of a straight-line leg.
///
/// `steps` of zero is treated as one: the path is then just both endpoints.
pub fn flight_path(from: Coordinate, to: Coordinate, steps: u32) -> FlightPath {
    FlightPath {
        from,
        to,
        steps: steps.max(1),
        next: 0,
    }
}

impl Iterator for FlightPath {
    type Item = Waypoint;

    fn next(&mut self) -> Option<Waypoint> {
        if self.next > self.steps {
            return None;
        }
        let step = self.next;
        self.next += 1;
        let progress = f64::from(step) / f64::from(self.steps);
        Some(Waypoint {
            step,
            progress,
            position: self.from.lerp(self.to, progress),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.steps + 1).saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FlightPath {}
impl FusedIterator for FlightPath {}

/// Moves drones along flight paths, persisting and broadcasting each step
pub struct FlightAnimator {
    ctx: FleetContext,
    duration: Duration,
    steps: u32,
}

impl FlightAnimator {
    /// Animator with the leg timing from `config`
    pub fn new(ctx: FleetContext, config: &FlightConfig) -> Self {
        Self {
            ctx,
            duration: Duration::from_millis(config.duration_ms),
            steps: config.steps.max(1),
        }
    }

    /// Pause between two waypoints
    pub fn step_delay(&self) -> Duration {
        self.duration / self.steps
    }

    /// Steps per leg
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Fly `drone_id` from `from` to `to`.
    ///
    /// Returns [`FlightError::Cancelled`] as soon as `cancel` fires; no
    /// position is written or broadcast after that.
    pub async fn animate(
        &self,
        drone_id: EntityId,
        from: Coordinate,
        to: Coordinate,
        cancel: &CancellationToken,
    ) -> Result<(), FlightError> {
        let delay = self.step_delay();
        let mut progress = 0.0;
        debug!(drone_id, steps = self.steps, ?delay, "Animating flight");

        for waypoint in flight_path(from, to, self.steps) {
            if cancel.is_cancelled() {
                return Err(FlightError::Cancelled { drone_id, progress });
            }

            {
                let _guard = self.ctx.locks.drone(drone_id).await;
                if cancel.is_cancelled() {
                    return Err(FlightError::Cancelled { drone_id, progress });
                }
                self.ctx
                    .store
                    .update_drone(drone_id, &DroneUpdate::new().position(waypoint.position))?;
            }
            progress = waypoint.progress;

            self.ctx.broadcaster.publish(&FleetEvent::DronePosition {
                drone_id,
                lat: waypoint.position.lat,
                lon: waypoint.position.lon,
                progress,
            });
            trace!(drone_id, step = waypoint.step, progress, "Flight step");

            if waypoint.step < self.steps {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(FlightError::Cancelled { drone_id, progress });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Ok(())
    }
}
