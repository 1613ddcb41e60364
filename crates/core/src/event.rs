//! Event catalog broadcast to fleet observers.
//!
//! Every event serializes as `{"type": "<name>", "data": {...}}`, the frame
//! format dashboards consume over the observer feed.

use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// Fleet state change delivered to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FleetEvent {
    /// Greeting sent to a freshly subscribed observer
    Connected {
        /// Human-readable status message
        message: String,
    },

    /// A pole's lamp failed
    LampBurnedOut {
        /// Pole identifier
        pole_id: EntityId,
        /// Pole display name
        pole_name: String,
    },

    /// A drone took off towards a pole
    DroneFlying {
        /// Drone identifier
        drone_id: EntityId,
        /// Name of the destination
        target: String,
    },

    /// One animation step of a flying drone
    DronePosition {
        /// Drone identifier
        drone_id: EntityId,
        /// Latitude in decimal degrees
        lat: f64,
        /// Longitude in decimal degrees
        lon: f64,
        /// Fraction of the leg flown (0.0 to 1.0)
        progress: f64,
    },

    /// A replacement drone arrived and the lamp works again
    LampFixed {
        /// Pole identifier
        pole_id: EntityId,
        /// Pole display name
        pole_name: String,
        /// Drone now installed at the pole
        drone_id: EntityId,
    },

    /// The installed drone of a pole was swapped
    DroneReplaced {
        /// Drone now installed at the pole
        new_drone_id: EntityId,
        /// Drone previously installed, if any
        old_drone_id: Option<EntityId>,
        /// Pole identifier
        pole_id: EntityId,
        /// Pole display name
        pole_name: String,
    },

    /// A retired drone is back at a base and serviceable
    DroneReady {
        /// Drone identifier
        drone_id: EntityId,
    },

    /// Every lamp in the fleet works
    AllLampsWorking {},
}

impl FleetEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            FleetEvent::Connected { .. } => "connected",
            FleetEvent::LampBurnedOut { .. } => "lamp_burned_out",
            FleetEvent::DroneFlying { .. } => "drone_flying",
            FleetEvent::DronePosition { .. } => "drone_position",
            FleetEvent::LampFixed { .. } => "lamp_fixed",
            FleetEvent::DroneReplaced { .. } => "drone_replaced",
            FleetEvent::DroneReady { .. } => "drone_ready",
            FleetEvent::AllLampsWorking {} => "all_lamps_working",
        }
    }
}
