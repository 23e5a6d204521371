//! Kinematic and thermal model of a single haul truck.
//!
//! `TruckState` is plain data: it is only ever mutated through the owning
//! [`TruckActor`](crate::actor::TruckActor), which serialises access.

use crate::config::{SimConfig, HEAT_PER_SPEED, IDLE_COOLING, IDLE_SPEED, TEMP_MAX, TEMP_MIN};
use crate::fault::FaultFlags;
use crate::protocol::{ActuatorUpdate, TruckCommand};
use serde::{Deserialize, Serialize};

/// Last throttle/heading demand received from the navigation controller.
///
/// Stored unclamped; limits are applied by [`TruckState::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuator {
    pub throttle_percent: f64,
    pub desired_heading: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TruckState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Degrees, always within (-180, 180].
    pub heading: f64,
    /// Always within [0, v_max].
    pub velocity: f64,
    /// Always within [TEMP_MIN, TEMP_MAX].
    pub temperature: f64,
    pub faults: FaultFlags,
    pub actuator: Actuator,
    /// Integer-rounded position last announced on the log topic.
    pub last_cell: (i64, i64),
}

/// What the actor must emit after a command has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishScope {
    /// Full telemetry sample plus companion signals.
    Telemetry,
    /// Companion temperature/fault signals only.
    Signals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub log: String,
    pub publish: PublishScope,
}

/// Point-in-time copy of a truck, as returned by fleet listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckRecord {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub temperature: f64,
    pub velocity: f64,
    pub vx: f64,
    pub vy: f64,
    pub fault_electrical: bool,
    pub fault_hydraulic: bool,
    pub throttle_percent: f64,
    pub desired_heading: f64,
}

impl TruckState {
    pub fn new(id: impl Into<String>, initial_temperature: f64) -> Self {
        Self {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            velocity: 0.0,
            temperature: clamp_temperature(initial_temperature),
            faults: FaultFlags::default(),
            actuator: Actuator::default(),
            last_cell: (0, 0),
        }
    }

    pub fn cell(&self) -> (i64, i64) {
        (round_cell(self.x), round_cell(self.y))
    }

    /// Advances the model by `dt`. Returns the new cell when the truck has
    /// crossed into a different integer cell since the last announcement.
    pub fn step(&mut self, dt: f64, config: &SimConfig) -> Option<(i64, i64)> {
        let accel = (self.actuator.throttle_percent / 100.0 * config.a_max)
            .clamp(-config.a_max, config.a_max);

        self.velocity = ((self.velocity + accel * dt) * config.friction).clamp(0.0, config.v_max);

        // Steering authority belongs to the navigation controller.
        self.heading = normalize_heading(self.actuator.desired_heading);

        let rad = self.heading.to_radians();
        self.x += self.velocity * dt * rad.cos();
        self.y += self.velocity * dt * rad.sin();

        let mut temperature = self.temperature + HEAT_PER_SPEED * self.velocity * dt;
        if self.velocity < IDLE_SPEED {
            temperature -= IDLE_COOLING * dt;
        }
        self.temperature = clamp_temperature(temperature);

        let cell = self.cell();
        if cell == self.last_cell {
            return None;
        }
        self.last_cell = cell;
        Some(cell)
    }

    pub fn apply_actuator(&mut self, update: &ActuatorUpdate) {
        if let Some(throttle) = update.throttle_percent {
            self.actuator.throttle_percent = throttle;
        }
        if let Some(heading) = update.desired_heading {
            self.actuator.desired_heading = heading;
        }
    }

    /// Applies an already validated command.
    pub fn apply_command(&mut self, command: &TruckCommand) -> CommandOutcome {
        match *command {
            TruckCommand::SetFault { electrical, hydraulic } => {
                self.faults.set(electrical, hydraulic);
                CommandOutcome {
                    log: format!(
                        "truck {}: faults -> electrical={}, hydraulic={}",
                        self.id, self.faults.electrical, self.faults.hydraulic
                    ),
                    publish: PublishScope::Signals,
                }
            }
            TruckCommand::ClearFaults => {
                self.faults.clear();
                CommandOutcome {
                    log: format!("truck {}: faults cleared", self.id),
                    publish: PublishScope::Signals,
                }
            }
            TruckCommand::TempStep { delta } => {
                self.temperature = clamp_temperature(self.temperature + delta);
                CommandOutcome {
                    log: format!("truck {}: temperature {:.1}", self.id, self.temperature),
                    publish: PublishScope::Telemetry,
                }
            }
            TruckCommand::ResetPosition { x, y, heading } => {
                let heading = normalize_heading(heading);
                self.x = x;
                self.y = y;
                self.heading = heading;
                self.velocity = 0.0;
                self.actuator = Actuator {
                    throttle_percent: 0.0,
                    desired_heading: heading,
                };
                self.last_cell = self.cell();
                CommandOutcome {
                    log: format!(
                        "truck {}: position ({},{})",
                        self.id, self.last_cell.0, self.last_cell.1
                    ),
                    publish: PublishScope::Telemetry,
                }
            }
            TruckCommand::Stop => {
                self.actuator.throttle_percent = 0.0;
                self.velocity = 0.0;
                let (cx, cy) = self.cell();
                CommandOutcome {
                    log: format!("truck {}: stop at ({},{})", self.id, cx, cy),
                    publish: PublishScope::Telemetry,
                }
            }
        }
    }

    pub fn record(&self) -> TruckRecord {
        let rad = self.heading.to_radians();
        TruckRecord {
            id: self.id.clone(),
            x: self.x,
            y: self.y,
            heading: self.heading,
            temperature: self.temperature,
            velocity: self.velocity,
            vx: self.velocity * rad.cos(),
            vy: self.velocity * rad.sin(),
            fault_electrical: self.faults.electrical,
            fault_hydraulic: self.faults.hydraulic,
            throttle_percent: self.actuator.throttle_percent,
            desired_heading: self.actuator.desired_heading,
        }
    }
}

/// Maps any angle in degrees onto (-180, 180].
pub fn normalize_heading(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

pub fn clamp_temperature(temperature: f64) -> f64 {
    temperature.clamp(TEMP_MIN, TEMP_MAX)
}

pub fn round_cell(value: f64) -> i64 {
    value.round() as i64
}
