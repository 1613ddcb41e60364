//! Core functionality for the LuminaFly street-light drone fleet.
//!
//! This crate provides the fundamental types, events and utilities used
//! across the LuminaFly workspace.

pub mod config;
pub mod error;
pub mod event;
pub mod geo;
pub mod logging;
pub mod types;

pub use config::{
    AllocationStrategy, Config, ConfigError, DispatchConfig, FlightConfig, NodeConfig,
    ReturnBaseStrategy, SimulationConfig,
};
pub use error::{CoreError, Result};
pub use event::FleetEvent;
pub use geo::Coordinate;
pub use types::{
    current_timestamp_ms, Base, Drone, DroneLocation, DroneStatus, EntityId, LampStatus, Mission,
    MissionStatus, MissionType, Pole,
};
