//! Pan/tilt solution for pointing the camera at a ground point.
//!
//! The command is expressed in the carrier's frame: the observer's own yaw
//! and pitch are subtracted out, so the absolute aim direction does not
//! change as the vehicle maneuvers.

use na::Point2;

use crate::camera::GeometryError;
use crate::units::{Angle, Length};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GimbalCommand {
    pub pan: Angle,
    pub tilt: Angle,
}

/// Pan/tilt needed for a camera at `observer` (ground position, `altitude`
/// above the plane) to look at `aim`, compensated for the carrier's
/// `yaw`/`pitch`.
pub fn aim_command(
    observer: Point2<f64>,
    altitude: Length,
    aim: Point2<f64>,
    yaw: Angle,
    pitch: Angle,
) -> Result<GimbalCommand, GeometryError> {
    let dx = aim.x - observer.x;
    let dy = aim.y - observer.y;
    let dz = -altitude.as_meters();

    let distance = (dx * dx + dy * dy + dz * dz).sqrt();
    if distance < 1e-9 {
        return Err(GeometryError::DegenerateAim);
    }

    let theta = (dz / distance).asin();
    let phi = dy.atan2(dx);

    Ok(GimbalCommand {
        pan: Angle::from_radians(phi) - yaw,
        tilt: -Angle::from_radians(theta) + pitch,
    })
}
