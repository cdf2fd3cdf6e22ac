//! Flat ground-plane helpers shared by the footprint and standoff math.

use na::{Point2, Rotation2};
use std::f64::consts::TAU;

use crate::units::{Angle, Length};

/// Rotates `point` counter-clockwise about `center`.
pub fn rotate_about(center: Point2<f64>, point: Point2<f64>, angle: Angle) -> Point2<f64> {
    center + Rotation2::new(angle.as_radians()) * (point - center)
}

/// Normalizes a bearing into `[0, 2π)`.
pub fn normalize_bearing(angle: Angle) -> Angle {
    let mut rad = angle.as_radians() % TAU;
    if rad < 0.0 {
        rad += TAU;
    }
    Angle::from_radians(rad)
}

/// Bearing of `to` as seen from `from`, normalized into `[0, 2π)`.
pub fn bearing(from: Point2<f64>, to: Point2<f64>) -> Angle {
    let offset = to - from;
    normalize_bearing(Angle::from_radians(offset.y.atan2(offset.x)))
}

pub fn distance(a: Point2<f64>, b: Point2<f64>) -> Length {
    Length::from_meters((b - a).norm())
}
