//! Simulation and server configuration.
//!
//! Every field has a default so a partial JSON file (or none at all) yields
//! a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Nominal integration step, in simulation time units.
pub const DT_DEFAULT: f64 = 2.0;
/// Maximum linear speed (units/s).
pub const V_MAX: f64 = 2.0;
/// Maximum acceleration magnitude (units/s²).
pub const A_MAX: f64 = 2.0;
/// Velocity decay factor applied after acceleration integration.
pub const FRICTION: f64 = 0.99;
/// Engine temperature of a freshly spawned truck.
pub const INITIAL_TEMPERATURE: f64 = 70.0;
pub const TEMP_MIN: f64 = -50.0;
pub const TEMP_MAX: f64 = 250.0;

// Thermal model
pub const HEAT_PER_SPEED: f64 = 0.01;
pub const IDLE_COOLING: f64 = 0.005;
pub const IDLE_SPEED: f64 = 0.1;

// Sensor noise (standard deviations)
pub const POS_NOISE_STD: f64 = 0.30;
pub const HEADING_NOISE_STD: f64 = 2.0;
pub const TEMP_NOISE_STD: f64 = 0.5;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

/// Standard deviations of the Gaussian noise added to published telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub position_std: f64,
    pub heading_std: f64,
    pub temperature_std: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            position_std: POS_NOISE_STD,
            heading_std: HEADING_NOISE_STD,
            temperature_std: TEMP_NOISE_STD,
        }
    }
}

impl NoiseConfig {
    /// Noise-free telemetry, used for reproducible runs.
    pub fn silent() -> Self {
        Self {
            position_std: 0.0,
            heading_std: 0.0,
            temperature_std: 0.0,
        }
    }
}

/// Per-truck physics and pacing parameters, shared by every actor in a fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Integration step per tick.
    pub dt: f64,
    /// Simulation seconds per wall-clock second. A tick sleeps `dt / time_scale`.
    pub time_scale: f64,
    pub v_max: f64,
    pub a_max: f64,
    pub friction: f64,
    pub initial_temperature: f64,
    pub noise: NoiseConfig,
    /// Base seed for per-actor noise sources. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: DT_DEFAULT,
            time_scale: 1.0,
            v_max: V_MAX,
            a_max: A_MAX,
            friction: FRICTION,
            initial_temperature: INITIAL_TEMPERATURE,
            noise: NoiseConfig::default(),
            seed: None,
        }
    }
}

impl SimConfig {
    /// Wall-clock length of one tick. Fails when `dt / time_scale` does not
    /// fit a `Duration` or rounds down to zero.
    pub fn tick_period(&self) -> Result<Duration, ConfigError> {
        let invalid = ConfigError::Invalid {
            field: "dt",
            reason: "dt / time_scale must be a representable, non-zero tick period",
        };
        match Duration::try_from_secs_f64(self.dt / self.time_scale) {
            Ok(period) if !period.is_zero() => Ok(period),
            _ => Err(invalid),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("dt", self.dt)?;
        positive("time_scale", self.time_scale)?;
        self.tick_period()?;
        positive("v_max", self.v_max)?;
        positive("a_max", self.a_max)?;
        if !(self.friction > 0.0 && self.friction <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "friction",
                reason: "must be in (0, 1]",
            });
        }
        if !(TEMP_MIN..=TEMP_MAX).contains(&self.initial_temperature) {
            return Err(ConfigError::Invalid {
                field: "initial_temperature",
                reason: "must be within the thermal limits",
            });
        }
        non_negative("noise.position_std", self.noise.position_std)?;
        non_negative("noise.heading_std", self.noise.heading_std)?;
        non_negative("noise.temperature_std", self.noise.temperature_std)?;
        Ok(())
    }
}

/// Top-level configuration of the simulator process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Capacity of the in-process broadcast bus.
    pub bus_capacity: usize,
    /// Trucks spawned when the server starts.
    pub initial_trucks: Vec<String>,
    pub sim: SimConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            initial_trucks: Vec::new(),
            sim: SimConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "bus_capacity",
                reason: "must be greater than zero",
            });
        }
        self.sim.validate()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be a positive number",
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must not be negative",
        })
    }
}
