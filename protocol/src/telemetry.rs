//! Telemetry payloads the coordinator consumes.
//!
//! Target reports arrive on each target's own channel and carry no tag;
//! observer-channel payloads are tag-discriminated like commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ProtocolError, TAG_KEY};

/// Per-target position report. `dest` is the target's own next waypoint,
/// which stationary targets set equal to their position.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTelemetry {
    pub pos_x: f64,
    pub pos_y: f64,
    pub dest_x: f64,
    pub dest_y: f64,
}

impl TargetTelemetry {
    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).expect("TargetTelemetry serialization cannot fail")
    }
}

/// Observer status report (tag 5).
///
/// `yaw_rad`/`pitch_rad` are the carrier attitude the gimbal solver
/// compensates for; older observer builds omit them, so they default to
/// level flight.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverTelemetry {
    #[serde(rename = "xGimbal_deg")]
    pub x_gimbal_deg: f64,
    #[serde(rename = "yGimbal_deg")]
    pub y_gimbal_deg: f64,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    #[serde(default)]
    pub yaw_rad: f64,
    #[serde(default)]
    pub pitch_rad: f64,
}

const OBSERVER_TELEMETRY_TAG: i64 = 5;

/// Anything the observer publishes on its own channel.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ObserverEvent {
    /// Reply to a ping (tag 1).
    Pong,
    Telemetry(ObserverTelemetry),
}

impl ObserverEvent {
    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(payload)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let tag = value
            .get(TAG_KEY)
            .and_then(Value::as_i64)
            .ok_or(ProtocolError::MissingField(TAG_KEY))?;
        Ok(match tag {
            1 => ObserverEvent::Pong,
            OBSERVER_TELEMETRY_TAG => ObserverEvent::Telemetry(serde_json::from_value(value)?),
            t => return Err(ProtocolError::UnknownTag(t)),
        })
    }

    pub fn to_json_string(&self) -> String {
        match self {
            ObserverEvent::Pong => format!(r#"{{"{TAG_KEY}":1}}"#),
            ObserverEvent::Telemetry(t) => {
                let mut value =
                    serde_json::to_value(t).expect("ObserverTelemetry serialization cannot fail");
                value[TAG_KEY] = Value::from(OBSERVER_TELEMETRY_TAG);
                value.to_string()
            }
        }
    }
}
