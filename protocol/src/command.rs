//! Commands the coordinator publishes to the observer, tagged the way the
//! vehicle-side command dispatcher expects them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{ProtocolError, TAG_KEY};

/// A station-keeping waypoint plus the ground point the observer should
/// face while holding it.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub heading_x: f64,
    pub heading_y: f64,
}

/// Ground point the observer's camera should be looking at.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraAim {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum GcsCommand {
    /// Liveness probe; the observer answers with a pong on its own channel.
    Ping,
    /// Switch the observer into waypoint-following mode.
    EnterWaypointMode,
    /// Commanded station-keeping point.
    Waypoint(Waypoint),
    /// Commanded camera aim point.
    CameraAim(CameraAim),
    /// Stop and exit the current mode.
    Halt,
    /// Shut the observer down.
    Terminate,
}

impl GcsCommand {
    pub fn tag(&self) -> i64 {
        match self {
            GcsCommand::Ping => 1,
            GcsCommand::EnterWaypointMode => 2,
            GcsCommand::Waypoint(_) => 3,
            GcsCommand::CameraAim(_) => 4,
            GcsCommand::Halt => -1,
            GcsCommand::Terminate => 0,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut value = match self {
            GcsCommand::Waypoint(wp) => {
                serde_json::to_value(wp).expect("Waypoint serialization cannot fail")
            }
            GcsCommand::CameraAim(aim) => {
                serde_json::to_value(aim).expect("CameraAim serialization cannot fail")
            }
            _ => json!({}),
        };
        value[TAG_KEY] = json!(self.tag());
        value
    }

    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }

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
            1 => GcsCommand::Ping,
            2 => GcsCommand::EnterWaypointMode,
            3 => GcsCommand::Waypoint(serde_json::from_value(value)?),
            4 => GcsCommand::CameraAim(serde_json::from_value(value)?),
            -1 => GcsCommand::Halt,
            0 => GcsCommand::Terminate,
            t => return Err(ProtocolError::UnknownTag(t)),
        })
    }
}
