pub use crate::command::{CameraAim, GcsCommand, Waypoint};
pub use crate::telemetry::{ObserverEvent, ObserverTelemetry, TargetTelemetry};

pub mod command;
pub mod telemetry;

use thiserror::Error;

/// Channel the ground control station publishes commands on.
pub const GCS_CHANNEL: &str = "GCS";

const OBSERVER_CHANNEL_PREFIX: &str = "Morse-QCOORD-";
const TARGET_CHANNEL_PREFIX: &str = "Morse-Marisa-";

/// Channel an observer vehicle publishes its status and telemetry on.
pub fn observer_channel(name: &str) -> String {
    format!("{OBSERVER_CHANNEL_PREFIX}{name}")
}

/// Channel a tracked ground vehicle publishes its telemetry on.
pub fn target_channel(name: &str) -> String {
    format!("{TARGET_CHANNEL_PREFIX}{name}")
}

/// Every payload is a flat key-value JSON record; command and observer
/// payloads carry an integer `tag` discriminant.
pub const TAG_KEY: &str = "tag";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message payload")]
    Malformed(#[from] serde_json::Error),

    #[error("Message is missing the '{0}' field")]
    MissingField(&'static str),

    #[error("Unknown message tag {0}")]
    UnknownTag(i64),
}
