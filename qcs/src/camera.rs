//! Camera optics and the ground footprint they project.
//!
//! The footprint is an axis-aligned rectangle in the camera's local ground
//! frame, sized by running the gimbal angle ± half the field of view down
//! to the ground plane, then rotated into the world frame by the bearing
//! from the observer to the aim point.

use na::{Point2, Vector2};
use parry2d_f64::shape::ConvexPolygon;
use thiserror::Error;

use crate::geo::{bearing, rotate_about};
use crate::units::{Angle, Length};

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Working altitude must be positive, got {0:?}")]
    NonPositiveAltitude(Length),

    #[error("Gimbal angle {0:?} lands on a tangent singularity")]
    TangentSingularity(Angle),

    #[error("Footprint corners do not form a polygon")]
    DegenerateFootprint,

    #[error("Aim point coincides with the camera position")]
    DegenerateAim,
}

/// Fixed optical parameters of the observer's camera.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraSpec {
    pub sensor_width: Length,
    pub sensor_height: Length,
    pub focal_length: Length,
}

impl CameraSpec {
    /// Field-of-view angles derived from the optics, per axis.
    pub fn field_of_view(&self) -> (Angle, Angle) {
        let half = |sensor: Length| {
            (sensor.as_millimeters() / (2.0 * self.focal_length.as_millimeters())).atan()
        };
        (
            Angle::from_radians(2.0 * half(self.sensor_width)),
            Angle::from_radians(2.0 * half(self.sensor_height)),
        )
    }
}

/// Which field of view the footprint math runs on: the angles derived from
/// the optics, or a session-calibrated override.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub enum FootprintBasis {
    #[default]
    DerivedOptics,
    Fixed(Angle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    pub spec: CameraSpec,
    pub basis: FootprintBasis,
}

/// Signed reach of the footprint from the camera's ground position along
/// each local axis. `front`/`behind` follow the pan axis, `left`/`right`
/// the tilt axis.
#[derive(Debug, Copy, Clone)]
pub struct FootprintExtents {
    pub front: Length,
    pub behind: Length,
    pub left: Length,
    pub right: Length,
}

/// World-frame footprint corners, lower-left / upper-left / upper-right /
/// lower-right in the camera's unrotated frame.
#[derive(Debug, Copy, Clone)]
pub struct Footprint {
    pub corners: [Point2<f64>; 4],
}

impl Footprint {
    pub fn centroid(&self) -> Point2<f64> {
        let sum = self
            .corners
            .iter()
            .fold(Vector2::zeros(), |acc, c| acc + c.coords);
        Point2::from(sum / self.corners.len() as f64)
    }

    pub fn to_polygon(&self) -> Result<ConvexPolygon, GeometryError> {
        ConvexPolygon::from_convex_hull(&self.corners).ok_or(GeometryError::DegenerateFootprint)
    }
}

impl CameraModel {
    pub fn new(spec: CameraSpec, basis: FootprintBasis) -> Self {
        CameraModel { spec, basis }
    }

    /// The field of view the footprint is computed from.
    pub fn footprint_fov(&self) -> (Angle, Angle) {
        match self.basis {
            FootprintBasis::DerivedOptics => self.spec.field_of_view(),
            FootprintBasis::Fixed(angle) => (angle, angle),
        }
    }

    /// Ground reach of the view frustum relative to the camera position,
    /// before any world-frame rotation.
    pub fn footprint_extents(
        &self,
        altitude: Length,
        gimbal_pan: Angle,
        gimbal_tilt: Angle,
    ) -> Result<FootprintExtents, GeometryError> {
        if altitude.as_meters() <= 0.0 {
            return Err(GeometryError::NonPositiveAltitude(altitude));
        }
        let (fov_x, fov_y) = self.footprint_fov();
        let reach = |gimbal: Angle, half_fov: Angle| -> Result<Length, GeometryError> {
            let angle = gimbal + half_fov;
            let rad = angle.as_radians();
            if rad.cos().abs() < 1e-12 {
                return Err(GeometryError::TangentSingularity(angle));
            }
            Ok(Length::from_meters(altitude.as_meters() * rad.tan()))
        };
        Ok(FootprintExtents {
            front: reach(gimbal_pan, 0.5 * fov_x)?,
            behind: reach(gimbal_pan, -0.5 * fov_x)?,
            left: reach(gimbal_tilt, -0.5 * fov_y)?,
            right: reach(gimbal_tilt, 0.5 * fov_y)?,
        })
    }

    /// The world-frame footprint for an observer at `position` aiming the
    /// camera toward `aim`.
    pub fn ground_footprint(
        &self,
        position: Point2<f64>,
        aim: Point2<f64>,
        altitude: Length,
        gimbal_pan: Angle,
        gimbal_tilt: Angle,
    ) -> Result<Footprint, GeometryError> {
        let ext = self.footprint_extents(altitude, gimbal_pan, gimbal_tilt)?;

        let theta = bearing(position, aim) - Angle::from_degrees(90.0);

        let corner = |x: Length, y: Length| {
            Point2::new(position.x + x.as_meters(), position.y + y.as_meters())
        };
        let unrotated = [
            corner(ext.left, ext.behind),
            corner(ext.left, ext.front),
            corner(ext.right, ext.front),
            corner(ext.right, ext.behind),
        ];

        Ok(Footprint {
            corners: unrotated.map(|c| rotate_about(position, c, theta)),
        })
    }
}
