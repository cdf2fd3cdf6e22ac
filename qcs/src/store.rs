//! Last-known state for every entity in the session. All mutation happens
//! on the control thread, driven by incoming telemetry.

use na::Point2;
use qcoord_protocol::{ObserverTelemetry, TargetTelemetry};
use tracing::debug;

use crate::coverage::CoverageInfo;
use crate::units::{Angle, Length};

/// A tracked ground vehicle. Position and destination stay unknown until
/// the first report arrives; from then on the target counts as in-contact
/// for the rest of the session, even if it goes silent.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub position: Option<Point2<f64>>,
    pub destination: Option<Point2<f64>>,
    pub in_contact: bool,
    pub coverage: Option<CoverageInfo>,
}

impl Target {
    fn new(name: String) -> Self {
        Target {
            name,
            position: None,
            destination: None,
            in_contact: false,
            coverage: None,
        }
    }
}

/// Owns all target records, in registration order.
#[derive(Debug, Default)]
pub struct TargetStore {
    targets: Vec<Target>,
}

impl TargetStore {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TargetStore {
            targets: names.into_iter().map(|n| Target::new(n.into())).collect(),
        }
    }

    /// Applies a telemetry report. Unregistered names are created on first
    /// sight rather than rejected; targets register implicitly.
    pub fn apply(&mut self, name: &str, telemetry: &TargetTelemetry) {
        let target = match self.targets.iter_mut().find(|t| t.name == name) {
            Some(t) => t,
            None => {
                debug!(target_name = name, "registering target on first sight");
                self.targets.push(Target::new(name.to_owned()));
                self.targets.last_mut().unwrap()
            }
        };
        target.position = Some(Point2::new(telemetry.pos_x, telemetry.pos_y));
        target.destination = Some(Point2::new(telemetry.dest_x, telemetry.dest_y));
        target.in_contact = true;
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Target> {
        self.targets.iter_mut().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Target> {
        self.targets.iter_mut()
    }

    pub fn in_contact(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| t.in_contact)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// The observer's own pose. Ground position and gimbal angles track
/// telemetry; the working altitude is fixed for the session and telemetry
/// `pos_z` is kept for logging only.
#[derive(Debug, Clone)]
pub struct ObserverPose {
    pub position: Point2<f64>,
    pub altitude: Length,
    pub gimbal_pan: Angle,
    pub gimbal_tilt: Angle,
    pub yaw: Angle,
    pub pitch: Angle,
    pub last_reported_altitude: Option<Length>,
}

impl ObserverPose {
    pub fn new(altitude: Length) -> Self {
        ObserverPose {
            position: Point2::origin(),
            altitude,
            gimbal_pan: Angle::from_degrees(0.0),
            gimbal_tilt: Angle::from_degrees(0.0),
            yaw: Angle::from_radians(0.0),
            pitch: Angle::from_radians(0.0),
            last_reported_altitude: None,
        }
    }

    pub fn apply(&mut self, telemetry: &ObserverTelemetry) {
        self.position = Point2::new(telemetry.pos_x, telemetry.pos_y);
        self.gimbal_pan = Angle::from_degrees(telemetry.x_gimbal_deg);
        self.gimbal_tilt = Angle::from_degrees(telemetry.y_gimbal_deg);
        self.yaw = Angle::from_radians(telemetry.yaw_rad);
        self.pitch = Angle::from_radians(telemetry.pitch_rad);
        self.last_reported_altitude = Some(Length::from_meters(telemetry.pos_z));
    }
}
