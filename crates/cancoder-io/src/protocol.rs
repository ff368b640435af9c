use cancoder_core::mechanism::{Mechanism2d, Segment};
use cancoder_core::{tags, RobotMode, TelemetrySnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STATE_TAGS: &[tags::Tag] = &[
    tags::POSITION_ROT,
    tags::VELOCITY_RPS,
    tags::POSITION_LATENCY_S,
    tags::VELOCITY_LATENCY_S,
    tags::MECHANISM_ANGLE_DEG,
    tags::SIM_VOLTAGE,
    tags::TIMESTAMP_US,
    tags::MECHANISM,
];

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }

    pub fn is_supported(&self) -> bool {
        self.major == 1
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::v1()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MechanismMsg {
    pub name: String,
    pub width: f64,
    pub height: f64,
    pub segments: Vec<Segment>,
}

impl From<&Mechanism2d> for MechanismMsg {
    fn from(mech: &Mechanism2d) -> Self {
        Self {
            name: mech.name.clone(),
            width: mech.width,
            height: mech.height,
            segments: mech.segments(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StateMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    pub sequence: u64,
    pub timestamp_us: u64,
    pub tick_count: u64,
    pub unix_us: u64,
    pub mode: Option<RobotMode>,
    pub position_rot: f64,
    pub velocity_rps: f64,
    pub position_latency_s: f64,
    pub velocity_latency_s: f64,
    pub mechanism_angle_deg: f64,
    pub sim_voltage: f64,
    pub mechanism: Option<MechanismMsg>,
}

impl StateMsg {
    pub fn from_snapshot(snapshot: &TelemetrySnapshot, sequence: u64, unix_us: u64) -> Self {
        Self {
            msg_type: "state",
            protocol_version: ProtocolVersion::v1(),
            sequence,
            timestamp_us: snapshot.timestamp_us,
            tick_count: snapshot.tick_count,
            unix_us,
            mode: snapshot.mode,
            position_rot: snapshot.position_rot,
            velocity_rps: snapshot.velocity_rps,
            position_latency_s: snapshot.position_latency_s,
            velocity_latency_s: snapshot.velocity_latency_s,
            mechanism_angle_deg: snapshot.mechanism_angle_deg,
            sim_voltage: snapshot.sim_voltage,
            mechanism: snapshot.mechanism.as_ref().map(MechanismMsg::from),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HelloMsg {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Joystick axis from a remote driver station.
#[derive(Debug, Deserialize)]
pub struct AxisMsg {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    pub left_y: f64,
}

/// Mode override; `null` hands control back to the local schedule.
#[derive(Debug, Deserialize)]
pub struct ModeMsg {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    pub mode: Option<RobotMode>,
}

#[derive(Debug)]
pub enum IncomingMessage {
    Hello(HelloMsg),
    Axis(AxisMsg),
    Mode(ModeMsg),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no string 'type' field")]
    MissingType,
    #[error("unknown message type '{0}'")]
    UnknownType(String),
}

impl IncomingMessage {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let msg_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?
            .to_string();
        match msg_type.as_str() {
            "hello" => Ok(IncomingMessage::Hello(serde_json::from_value(value)?)),
            "axis" => Ok(IncomingMessage::Axis(serde_json::from_value(value)?)),
            "mode" => Ok(IncomingMessage::Mode(serde_json::from_value(value)?)),
            _ => Err(ProtocolError::UnknownType(msg_type)),
        }
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        match self {
            IncomingMessage::Hello(msg) => msg.protocol_version,
            IncomingMessage::Axis(msg) => msg.protocol_version,
            IncomingMessage::Mode(msg) => msg.protocol_version,
        }
    }
}
