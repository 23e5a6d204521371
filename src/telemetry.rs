//! Telemetry samples and companion scalar signals.

use crate::config::NoiseConfig;
use crate::fault::flag_text;
use crate::noise::NoiseSource;
use crate::protocol::topics;
use crate::truck::TruckState;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One published sensor sample. Position, heading and temperature carry
/// sensor noise; fault flags are exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub truck_id: String,
    pub sequence: u64,
    /// Wall-clock seconds since the Unix epoch.
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub temperature: f64,
    pub fault_electrical: bool,
    pub fault_hydraulic: bool,
    pub dt: f64,
}

impl TelemetrySample {
    pub fn capture(
        state: &TruckState,
        sequence: u64,
        dt: f64,
        noise: &mut NoiseSource,
        config: &NoiseConfig,
    ) -> Self {
        Self {
            truck_id: state.id.clone(),
            sequence,
            timestamp: unix_timestamp(),
            x: round3(noise.perturb(state.x, config.position_std)),
            y: round3(noise.perturb(state.y, config.position_std)),
            heading: round3(noise.perturb(state.heading, config.heading_std)),
            temperature: round3(noise.perturb(state.temperature, config.temperature_std)),
            fault_electrical: state.faults.electrical,
            fault_hydraulic: state.faults.hydraulic,
            dt,
        }
    }
}

/// The three single-value feeds published next to every sample.
pub fn signals(state: &TruckState) -> [(String, String); 3] {
    let id = state.id.as_str();
    [
        (topics::temperature_signal(id), (state.temperature.round() as i64).to_string()),
        (topics::electrical_signal(id), flag_text(state.faults.electrical).to_string()),
        (topics::hydraulic_signal(id), flag_text(state.faults.hydraulic).to_string()),
    ]
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
