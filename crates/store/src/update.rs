//! Partial updates and inserts.
//!
//! Only the fields that are set are written; everything else is left as the
//! store has it.

use luminafly_core::{
    current_timestamp_ms, Coordinate, Drone, DroneLocation, DroneStatus, EntityId, LampStatus,
    Mission, MissionStatus, MissionType, Pole,
};

/// Partial drone update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DroneUpdate {
    pub status: Option<DroneStatus>,
    pub lamp_status: Option<LampStatus>,
    pub battery_level: Option<u8>,
    pub position: Option<Coordinate>,
    pub location: Option<DroneLocation>,
    /// Added to `total_missions`
    pub missions_completed: u32,
}

impl DroneUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: DroneStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn lamp_status(mut self, lamp_status: LampStatus) -> Self {
        self.lamp_status = Some(lamp_status);
        self
    }

    pub fn battery_level(mut self, battery_level: u8) -> Self {
        self.battery_level = Some(battery_level.min(100));
        self
    }

    pub fn position(mut self, position: Coordinate) -> Self {
        self.position = Some(position);
        self
    }

    pub fn location(mut self, location: DroneLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn complete_mission(mut self) -> Self {
        self.missions_completed += 1;
        self
    }

    pub fn apply(&self, drone: &mut Drone) {
        if let Some(status) = self.status {
            drone.status = status;
        }
        if let Some(lamp_status) = self.lamp_status {
            drone.lamp_status = lamp_status;
        }
        if let Some(battery_level) = self.battery_level {
            drone.battery_level = battery_level;
        }
        if let Some(position) = self.position {
            drone.position = position;
        }
        if let Some(location) = self.location {
            drone.location = location;
        }
        drone.total_missions += self.missions_completed;
    }
}

/// Partial pole update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoleUpdate {
    pub lamp_status: Option<LampStatus>,
    /// `Some(None)` clears the installed drone
    pub drone_id: Option<Option<EntityId>>,
}

impl PoleUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lamp_status(mut self, lamp_status: LampStatus) -> Self {
        self.lamp_status = Some(lamp_status);
        self
    }

    pub fn drone_id(mut self, drone_id: Option<EntityId>) -> Self {
        self.drone_id = Some(drone_id);
        self
    }

    pub fn apply(&self, pole: &mut Pole) {
        if let Some(lamp_status) = self.lamp_status {
            pole.lamp_status = lamp_status;
        }
        if let Some(drone_id) = self.drone_id {
            pole.drone_id = drone_id;
        }
    }
}

/// Fields of a mission at creation time
#[derive(Debug, Clone, PartialEq)]
pub struct NewMission {
    pub drone_id: EntityId,
    pub pole_id: Option<EntityId>,
    pub from_base_id: Option<EntityId>,
    pub to_base_id: Option<EntityId>,
    pub from_pole_id: Option<EntityId>,
    pub to_pole_id: Option<EntityId>,
    pub mission_type: MissionType,
    pub status: MissionStatus,
}

impl NewMission {
    /// Base-to-pole repair flight, started immediately
    pub fn replacement(drone_id: EntityId, pole_id: EntityId, from_base_id: Option<EntityId>) -> Self {
        Self {
            drone_id,
            pole_id: Some(pole_id),
            from_base_id,
            to_base_id: None,
            from_pole_id: None,
            to_pole_id: Some(pole_id),
            mission_type: MissionType::Replacement,
            status: MissionStatus::InProgress,
        }
    }

    /// Flight back to a base, started immediately
    pub fn return_to_base(drone_id: EntityId, from_pole_id: Option<EntityId>, to_base_id: EntityId) -> Self {
        Self {
            drone_id,
            pole_id: from_pole_id,
            from_base_id: None,
            to_base_id: Some(to_base_id),
            from_pole_id,
            to_pole_id: None,
            mission_type: MissionType::Return,
            status: MissionStatus::InProgress,
        }
    }

    /// Materialize with an assigned id
    pub fn into_mission(self, id: EntityId) -> Mission {
        let now = current_timestamp_ms();
        Mission {
            id,
            drone_id: self.drone_id,
            pole_id: self.pole_id,
            from_base_id: self.from_base_id,
            to_base_id: self.to_base_id,
            from_pole_id: self.from_pole_id,
            to_pole_id: self.to_pole_id,
            mission_type: self.mission_type,
            status: self.status,
            created_at: now,
            started_at: (self.status == MissionStatus::InProgress).then_some(now),
            completed_at: None,
            failure_reason: None,
        }
    }
}

/// Mission status change
#[derive(Debug, Clone, PartialEq)]
pub struct MissionUpdate {
    pub status: MissionStatus,
    pub failure_reason: Option<String>,
}

impl MissionUpdate {
    pub fn started() -> Self {
        Self {
            status: MissionStatus::InProgress,
            failure_reason: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: MissionStatus::Completed,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: MissionStatus::Failed,
            failure_reason: Some(reason.into()),
        }
    }

    /// Validate the transition and write it into `mission`.
    pub fn apply(&self, mission: &mut Mission) -> Result<(), luminafly_core::CoreError> {
        mission.status = mission.status.transition(self.status)?;
        let now = current_timestamp_ms();
        match self.status {
            MissionStatus::InProgress => mission.started_at = Some(now),
            MissionStatus::Completed | MissionStatus::Failed => mission.completed_at = Some(now),
            MissionStatus::Pending => {}
        }
        if self.failure_reason.is_some() {
            mission.failure_reason = self.failure_reason.clone();
        }
        Ok(())
    }
}
