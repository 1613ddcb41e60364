//! Query filters understood by every [`EntityStore`](crate::EntityStore).
//!
//! All criteria are ANDed; an unset field matches everything.

use luminafly_core::{
    Base, Drone, DroneStatus, EntityId, LampStatus, Mission, MissionStatus, MissionType, Pole,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DroneFilter {
    pub id: Option<EntityId>,
    pub status: Option<DroneStatus>,
    /// `Some(true)` keeps drones docked at any base
    pub docked: Option<bool>,
    /// Strictly greater battery level
    pub battery_above: Option<u8>,
    pub limit: Option<usize>,
}

impl DroneFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Active drones docked at a base with more than `min_battery` charge.
    pub fn available(min_battery: u8) -> Self {
        Self {
            status: Some(DroneStatus::Active),
            docked: Some(true),
            battery_above: Some(min_battery),
            ..Self::default()
        }
    }

    pub fn matches(&self, drone: &Drone) -> bool {
        self.id.map_or(true, |id| drone.id == id)
            && self.status.map_or(true, |s| drone.status == s)
            && self.docked.map_or(true, |d| drone.current_base_id().is_some() == d)
            && self.battery_above.map_or(true, |b| drone.battery_level > b)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoleFilter {
    pub id: Option<EntityId>,
    pub lamp_status: Option<LampStatus>,
    /// `Some(true)` keeps poles with an installed drone
    pub has_drone: Option<bool>,
    pub limit: Option<usize>,
}

impl PoleFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn burned_out() -> Self {
        Self {
            lamp_status: Some(LampStatus::BurnedOut),
            ..Self::default()
        }
    }

    /// Working poles with a drone installed; the failure injector's candidates.
    pub fn working_with_drone() -> Self {
        Self {
            lamp_status: Some(LampStatus::Working),
            has_drone: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, pole: &Pole) -> bool {
        self.id.map_or(true, |id| pole.id == id)
            && self.lamp_status.map_or(true, |s| pole.lamp_status == s)
            && self.has_drone.map_or(true, |h| pole.drone_id.is_some() == h)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseFilter {
    pub id: Option<EntityId>,
}

impl BaseFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self { id: Some(id) }
    }

    pub fn matches(&self, base: &Base) -> bool {
        self.id.map_or(true, |id| base.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionFilter {
    pub id: Option<EntityId>,
    pub drone_id: Option<EntityId>,
    pub pole_id: Option<EntityId>,
    pub status: Option<MissionStatus>,
    pub mission_type: Option<MissionType>,
}

impl MissionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn in_progress() -> Self {
        Self {
            status: Some(MissionStatus::InProgress),
            ..Self::default()
        }
    }

    pub fn matches(&self, mission: &Mission) -> bool {
        self.id.map_or(true, |id| mission.id == id)
            && self.drone_id.map_or(true, |d| mission.drone_id == d)
            && self.pole_id.map_or(true, |p| mission.pole_id == Some(p))
            && self.status.map_or(true, |s| mission.status == s)
            && self.mission_type.map_or(true, |t| mission.mission_type == t)
    }
}
