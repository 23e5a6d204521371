//! Topic grammar and payload schema of the fleet command/telemetry bus.
//!
//! Lifecycle operations live on fleet-wide topics, per-truck operations on
//! topics carrying the truck id, so routing never needs to look inside a
//! payload beyond decoding it for the selected handler.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const MAX_PAYLOAD_SIZE: usize = 4096;

pub mod topics {
    pub const SPAWN: &str = "fleet/spawn";
    pub const REMOVE: &str = "fleet/remove";
    pub const LIST: &str = "fleet/list";
    pub const LIST_RESPONSE: &str = "fleet/list/response";

    pub fn command(id: &str) -> String {
        format!("truck/{id}/cmd")
    }

    pub fn actuator(id: &str) -> String {
        format!("truck/{id}/actuator")
    }

    pub fn telemetry(id: &str) -> String {
        format!("truck/{id}/telemetry")
    }

    pub fn temperature_signal(id: &str) -> String {
        format!("truck/{id}/signal/temperature")
    }

    pub fn electrical_signal(id: &str) -> String {
        format!("truck/{id}/signal/fault_electrical")
    }

    pub fn hydraulic_signal(id: &str) -> String {
        format!("truck/{id}/signal/fault_hydraulic")
    }

    pub fn log(id: &str) -> String {
        format!("truck/{id}/log")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),
    #[error("Payload exceeds {} bytes", MAX_PAYLOAD_SIZE)]
    MessageTooLarge,
    #[error("Invalid parameter `{0}`")]
    InvalidParameter(&'static str),
    #[error("Invalid topic `{0}`")]
    InvalidTopic(String),
    #[error("Unexpected `{found}` command on topic `{topic}`")]
    UnexpectedCommand { topic: &'static str, found: &'static str },
}

/// Parsed form of every topic the fleet understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Spawn,
    Remove,
    List,
    ListResponse,
    Command(String),
    Actuator(String),
    Telemetry(String),
    Signal { truck_id: String, name: String },
    Log(String),
}

impl Topic {
    pub fn parse(topic: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidTopic(topic.to_string());
        let segments: Vec<&str> = topic.split('/').collect();

        match segments.as_slice() {
            ["fleet", "spawn"] => Ok(Topic::Spawn),
            ["fleet", "remove"] => Ok(Topic::Remove),
            ["fleet", "list"] => Ok(Topic::List),
            ["fleet", "list", "response"] => Ok(Topic::ListResponse),
            ["truck", id, rest @ ..] => {
                if !valid_id_segment(id) {
                    return Err(invalid());
                }
                let id = (*id).to_string();
                match rest {
                    ["cmd"] => Ok(Topic::Command(id)),
                    ["actuator"] => Ok(Topic::Actuator(id)),
                    ["telemetry"] => Ok(Topic::Telemetry(id)),
                    ["log"] => Ok(Topic::Log(id)),
                    ["signal", name] if !name.is_empty() => Ok(Topic::Signal {
                        truck_id: id,
                        name: (*name).to_string(),
                    }),
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }

    /// Topics the fleet consumes, as opposed to ones it produces.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            Topic::Spawn | Topic::Remove | Topic::List | Topic::Command(_) | Topic::Actuator(_)
        )
    }
}

fn valid_id_segment(id: &str) -> bool {
    !id.is_empty() && !id.contains(['+', '#'])
}

/// Truck identifier as it appears on the wire: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TruckId(pub String);

impl TruckId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TruckId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TruckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TruckId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) if valid_id_segment(&s) && !s.contains('/') => Ok(TruckId(s)),
            Value::Number(n) if n.is_u64() || n.is_i64() => Ok(TruckId(n.to_string())),
            other => Err(de::Error::custom(format!("invalid truck id: {other}"))),
        }
    }
}

/// One id or a list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TruckIds {
    One(TruckId),
    Many(Vec<TruckId>),
}

impl TruckIds {
    pub fn into_vec(self) -> Vec<TruckId> {
        match self {
            TruckIds::One(id) => vec![id],
            TruckIds::Many(ids) => ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum LifecycleCommand {
    Spawn { truck_id: TruckId },
    Remove { truck_id: TruckIds },
}

impl LifecycleCommand {
    fn name(&self) -> &'static str {
        match self {
            LifecycleCommand::Spawn { .. } => "spawn",
            LifecycleCommand::Remove { .. } => "remove",
        }
    }
}

/// Body of a `fleet/list` request. An empty payload is a request without
/// a reply topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl ListRequest {
    pub fn response_topic(&self) -> &str {
        self.reply_to.as_deref().unwrap_or(topics::LIST_RESPONSE)
    }
}

/// Per-truck control commands received on `truck/{id}/cmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum TruckCommand {
    SetFault {
        #[serde(
            default,
            alias = "eletrica",
            alias = "electrica",
            deserialize_with = "lenient_flag",
            skip_serializing_if = "Option::is_none"
        )]
        electrical: Option<bool>,
        #[serde(
            default,
            alias = "hidraulica",
            deserialize_with = "lenient_flag",
            skip_serializing_if = "Option::is_none"
        )]
        hydraulic: Option<bool>,
    },
    ClearFaults,
    TempStep {
        #[serde(default, deserialize_with = "lenient_number")]
        delta: f64,
    },
    ResetPosition {
        #[serde(default, deserialize_with = "lenient_number")]
        x: f64,
        #[serde(default, deserialize_with = "lenient_number")]
        y: f64,
        #[serde(default, alias = "ang", deserialize_with = "lenient_number")]
        heading: f64,
    },
    Stop,
}

impl TruckCommand {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match *self {
            TruckCommand::TempStep { delta } => finite("delta", delta),
            TruckCommand::ResetPosition { x, y, heading } => {
                finite("x", x)?;
                finite("y", y)?;
                finite("heading", heading)
            }
            TruckCommand::SetFault { .. } | TruckCommand::ClearFaults | TruckCommand::Stop => Ok(()),
        }
    }
}

/// Partial actuator demand received on `truck/{id}/actuator`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorUpdate {
    #[serde(
        default,
        alias = "o_aceleracao",
        deserialize_with = "lenient_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub throttle_percent: Option<f64>,
    #[serde(
        default,
        alias = "o_direcao",
        deserialize_with = "lenient_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub desired_heading: Option<f64>,
}

impl ActuatorUpdate {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if let Some(throttle) = self.throttle_percent {
            finite("throttle_percent", throttle)?;
        }
        if let Some(heading) = self.desired_heading {
            finite("desired_heading", heading)?;
        }
        Ok(())
    }
}

fn finite(name: &'static str, value: f64) -> Result<(), ProtocolError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ProtocolError::InvalidParameter(name))
    }
}

/// Accepts booleans, 0/1 numbers and "true"/"false"/"1"/"0" strings.
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let flag = match &value {
        Value::Null => return Ok(None),
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => false,
            Some(v) if v == 1.0 => true,
            _ => return Err(de::Error::custom(format!("invalid fault flag: {value}"))),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => true,
            "false" | "0" | "off" => false,
            _ => return Err(de::Error::custom(format!("invalid fault flag: {value}"))),
        },
        _ => return Err(de::Error::custom(format!("invalid fault flag: {value}"))),
    };
    Ok(Some(flag))
}

/// Accepts JSON numbers and numeric strings such as `"50"`.
fn lenient_optional_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid number: {value}"))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid number: {value}"))),
        _ => Err(de::Error::custom(format!("invalid number: {value}"))),
    }
}

/// Like [`lenient_optional_number`], with `null` read as zero.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(lenient_optional_number(deserializer)?.unwrap_or_default())
}

fn decode<T: for<'de> Deserialize<'de>>(payload: &str) -> Result<T, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::MessageTooLarge);
    }
    serde_json::from_str(payload).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
}

pub fn parse_truck_command(payload: &str) -> Result<TruckCommand, ProtocolError> {
    let command: TruckCommand = decode(payload)?;
    command.validate()?;
    Ok(command)
}

pub fn parse_actuator(payload: &str) -> Result<ActuatorUpdate, ProtocolError> {
    // Derived struct decoding would also take a positional array
    let value: Value = decode(payload)?;
    if !value.is_object() {
        return Err(ProtocolError::InvalidJson(format!("expected an object, got {value}")));
    }
    let update: ActuatorUpdate =
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    update.validate()?;
    Ok(update)
}

pub fn parse_spawn(payload: &str) -> Result<TruckId, ProtocolError> {
    match decode::<LifecycleCommand>(payload)? {
        LifecycleCommand::Spawn { truck_id } => Ok(truck_id),
        other => Err(ProtocolError::UnexpectedCommand {
            topic: topics::SPAWN,
            found: other.name(),
        }),
    }
}

pub fn parse_remove(payload: &str) -> Result<Vec<TruckId>, ProtocolError> {
    match decode::<LifecycleCommand>(payload)? {
        LifecycleCommand::Remove { truck_id } => Ok(truck_id.into_vec()),
        other => Err(ProtocolError::UnexpectedCommand {
            topic: topics::REMOVE,
            found: other.name(),
        }),
    }
}

pub fn parse_list_request(payload: &str) -> Result<ListRequest, ProtocolError> {
    if payload.trim().is_empty() {
        return Ok(ListRequest::default());
    }
    decode(payload)
}
