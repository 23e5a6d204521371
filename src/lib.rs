//! # Truck Fleet Simulator
//!
//! A message-driven simulator of a fleet of autonomous mining haul trucks.
//! Each truck runs its own fixed-period tick loop, integrating simple
//! kinematics and an engine-temperature model, and publishes noisy
//! telemetry on a topic-addressed bus. Operators spawn, remove, list and
//! command trucks by publishing JSON payloads on well-known topics.
//!
//! ## Features
//!
//! - **Kinematic simulation**: speed and acceleration limits, friction, heading tracking
//! - **Thermal model**: speed-proportional heating, idle cooling, bounded temperature
//! - **Fault injection**: electrical and hydraulic fault flags per truck
//! - **Dynamic fleet**: spawn/remove/list at runtime, concurrent with ticking
//! - **Telemetry**: JSON samples with Gaussian sensor noise plus scalar signals
//! - **TCP gateway**: newline-delimited JSON publish/subscribe for remote clients
//!
//! ## Quick Start
//!
//! ```rust
//! use fleetsim::config::SimConfig;
//! use fleetsim::protocol::ActuatorUpdate;
//! use fleetsim::truck::TruckState;
//!
//! let config = SimConfig::default();
//! let mut truck = TruckState::new("T1", config.initial_temperature);
//!
//! // Full throttle heading east
//! truck.apply_actuator(&ActuatorUpdate {
//!     throttle_percent: Some(100.0),
//!     desired_heading: Some(0.0),
//! });
//! truck.step(config.dt, &config);
//!
//! assert!(truck.velocity <= config.v_max);
//! assert!(truck.x > 0.0);
//! ```
//!
//! ## Architecture
//!
//! - [`truck`] - Per-truck state and physics
//! - [`actor`] - Tick loop and command application for one truck
//! - [`registry`] - Live fleet, keyed by truck id
//! - [`dispatcher`] - Routes inbound topics to the registry
//! - [`protocol`] - Topic grammar and payload schema
//! - [`telemetry`] - Telemetry samples and companion signals
//! - [`bus`] - In-process publish/subscribe bus
//! - [`gateway`] - TCP bridge to the bus
//! - [`server`] - Process wiring and shutdown

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod actor;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod fault;
pub mod gateway;
pub mod noise;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod truck;

// Re-export main public types for convenience
pub use actor::TruckActor;
pub use bus::{BroadcastBus, Message, Publisher, TopicFilter};
pub use config::{ServerConfig, SimConfig};
pub use dispatcher::{Dispatch, FleetDispatcher};
pub use protocol::{ActuatorUpdate, TruckCommand, TruckId};
pub use registry::FleetRegistry;
pub use server::FleetServer;
pub use truck::{TruckRecord, TruckState};
