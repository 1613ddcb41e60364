//! Fleet entity types: drones, poles, bases and missions.
//!
//! These mirror the records held by the entity store. The drone location is
//! modelled as a single enum so a drone can never be docked at a base and
//! installed at a pole at the same time.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geo::Coordinate;

/// Identifier shared by every stored entity.
pub type EntityId = i64;

/// Operational status of a drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    /// Ready for work (docked or installed)
    Active,
    /// Airborne on a mission leg
    Flying,
    /// Pulled from service
    Maintenance,
    /// Decommissioned
    Inactive,
    /// Charging at a base
    Charging,
}

/// State of a lamp, either on a pole or carried by a drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LampStatus {
    /// Lamp is lit
    Working,
    /// Lamp failed and needs a replacement drone
    BurnedOut,
    /// Pole is disconnected (poles only)
    Offline,
}

/// Where a drone currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DroneLocation {
    /// Docked at a base
    Base(EntityId),
    /// Installed at a pole
    Pole(EntityId),
    /// Between a base and a pole
    InFlight,
}

/// A maintenance drone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    /// Drone identifier
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Unique serial number
    pub serial_number: String,
    /// Operational status
    pub status: DroneStatus,
    /// State of the lamp module the drone carries
    pub lamp_status: LampStatus,
    /// Battery percentage (0-100)
    pub battery_level: u8,
    /// Last persisted position
    pub position: Coordinate,
    /// Base, pole or in flight
    pub location: DroneLocation,
    /// Completed retirement flights
    pub total_missions: u32,
}

impl Drone {
    /// Base the drone is docked at, if any
    pub fn current_base_id(&self) -> Option<EntityId> {
        match self.location {
            DroneLocation::Base(id) => Some(id),
            _ => None,
        }
    }

    /// Pole the drone is installed at, if any
    pub fn current_pole_id(&self) -> Option<EntityId> {
        match self.location {
            DroneLocation::Pole(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the drone can be sent out on a repair.
    pub fn is_available(&self, min_battery: u8) -> bool {
        self.status == DroneStatus::Active
            && self.current_base_id().is_some()
            && self.battery_level > min_battery
    }
}

/// A street-light pole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pole {
    /// Pole identifier
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Fixed position
    pub position: Coordinate,
    /// Lamp state
    pub lamp_status: LampStatus,
    /// Drone installed at this pole
    pub drone_id: Option<EntityId>,
}

/// A docking and charging site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Base {
    /// Base identifier
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Fixed position
    pub position: Coordinate,
    /// Maximum docked drones
    pub capacity: u32,
    /// Currently docked drones
    pub current_drones: u32,
}

/// Kind of work a mission represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    /// Fly a fresh drone from a base to a burned-out pole
    Replacement,
    /// Fly a drone back to a base
    Return,
    /// Survey flight
    Inspection,
    /// Priority flight
    Emergency,
}

/// Mission lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Created, not yet started
    Pending,
    /// Drone is flying the leg
    InProgress,
    /// Leg committed
    Completed,
    /// Leg aborted
    Failed,
}

impl MissionStatus {
    /// Whether no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Failed)
    }

    /// Check that `self -> next` is a legal lifecycle step.
    pub fn transition(self, next: MissionStatus) -> Result<MissionStatus, CoreError> {
        use MissionStatus::*;
        match (self, next) {
            (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed) => {
                Ok(next)
            }
            _ => Err(CoreError::InvalidTransition { from: self, to: next }),
        }
    }
}

/// A tracked unit of work moving one drone between a base and a pole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    /// Mission identifier
    pub id: EntityId,
    /// Drone flying the mission
    pub drone_id: EntityId,
    /// Pole being repaired
    pub pole_id: Option<EntityId>,
    /// Departure base
    pub from_base_id: Option<EntityId>,
    /// Arrival base
    pub to_base_id: Option<EntityId>,
    /// Departure pole
    pub from_pole_id: Option<EntityId>,
    /// Arrival pole
    pub to_pole_id: Option<EntityId>,
    /// Mission kind
    pub mission_type: MissionType,
    /// Lifecycle state
    pub status: MissionStatus,
    /// Creation time (Unix milliseconds)
    pub created_at: u64,
    /// Start time (Unix milliseconds)
    pub started_at: Option<u64>,
    /// Completion or failure time (Unix milliseconds)
    pub completed_at: Option<u64>,
    /// Why the mission failed
    pub failure_reason: Option<String>,
}

/// Current Unix time in milliseconds
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
