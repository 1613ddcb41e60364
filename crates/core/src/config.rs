//! Configuration management for LuminaFly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::types::EntityId;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub dispatch: DispatchConfig,
    pub flight: FlightConfig,
    pub node: NodeConfig,
}

/// Control loop and failure injection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Lower bound of the randomized inter-tick delay
    pub interval_min_ms: u64,
    /// Upper bound of the randomized inter-tick delay
    pub interval_max_ms: u64,
    /// Maximum poles burned per tick
    pub burn_per_tick: usize,
    /// Reset every lamp to working when the loop starts
    pub reset_on_start: bool,
    /// RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_min_ms: 2000,
            interval_max_ms: 3000,
            burn_per_tick: 3,
            reset_on_start: true,
            seed: None,
        }
    }
}

/// How candidate drones are ranked for a pole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// First drone returned by the store
    #[default]
    FirstAvailable,
    /// Closest drone to the pole
    NearestFirst,
}

/// Where retired drones fly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnBaseStrategy {
    /// Always the same depot
    Fixed {
        /// Depot base id
        base_id: EntityId,
    },
    /// Closest base to the pole
    Nearest,
}

impl Default for ReturnBaseStrategy {
    fn default() -> Self {
        ReturnBaseStrategy::Fixed { base_id: 1 }
    }
}

/// Allocation and recovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Drones must have strictly more battery than this
    pub min_battery: u8,
    pub allocation: AllocationStrategy,
    pub return_base: ReturnBaseStrategy,
    /// Recovery flights tried before a stranded drone goes to maintenance
    pub max_recovery_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_battery: 30,
            allocation: AllocationStrategy::default(),
            return_base: ReturnBaseStrategy::default(),
            max_recovery_attempts: 3,
        }
    }
}

/// Flight animation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    /// Wall time of a single leg
    pub duration_ms: u64,
    /// Interpolation steps per leg
    pub steps: u32,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            duration_ms: 5000,
            steps: 100,
        }
    }
}

/// Node process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Observer feed listen address
    pub listen_addr: String,
    /// SQLite database path; in-memory store when absent
    pub database_path: Option<String>,
    /// Emit JSON logs
    pub log_json: bool,
    /// Reserve drones seeded at the depot
    pub reserve_drones: u32,
    /// Drones installed on poles at seed time
    pub installed_drones: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            database_path: None,
            log_json: false,
            reserve_drones: 20,
            installed_drones: 4,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.interval_min_ms > sim.interval_max_ms {
            return Err(ConfigError::Invalid(format!(
                "interval_min_ms ({}) exceeds interval_max_ms ({})",
                sim.interval_min_ms, sim.interval_max_ms
            )));
        }
        if self.flight.steps == 0 {
            return Err(ConfigError::Invalid("flight.steps must be positive".to_string()));
        }
        if self.dispatch.min_battery > 100 {
            return Err(ConfigError::Invalid(format!(
                "dispatch.min_battery must be at most 100, got {}",
                self.dispatch.min_battery
            )));
        }
        Ok(())
    }
}
