//! A lightweight uom-ish module covering the handful of quantities the
//! coordinator deals in. Simulator ground coordinates are meters.
#![allow(dead_code)]

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

#[derive(Copy, Clone, PartialEq, PartialOrd)]
pub struct Length {
    meters: f64,
}

impl std::fmt::Debug for Length {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} m", self.meters)
    }
}

impl Length {
    pub const fn from_meters(meters: f64) -> Length {
        Length { meters }
    }

    pub fn from_millimeters(mm: f64) -> Length {
        Length {
            meters: mm / 1000.0,
        }
    }

    pub fn as_meters(&self) -> f64 {
        self.meters
    }

    pub fn as_millimeters(&self) -> f64 {
        self.meters * 1000.0
    }

    pub fn abs(&self) -> Length {
        Length::from_meters(self.meters.abs())
    }
}

impl Add<Length> for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Self::Output {
        Length::from_meters(self.as_meters() + rhs.as_meters())
    }
}

impl Sub<Length> for Length {
    type Output = Length;

    fn sub(self, rhs: Length) -> Self::Output {
        Length::from_meters(self.as_meters() - rhs.as_meters())
    }
}

impl Neg for Length {
    type Output = Length;

    fn neg(self) -> Self::Output {
        Length::from_meters(-self.as_meters())
    }
}

impl Mul<Length> for f64 {
    type Output = Length;

    fn mul(self, rhs: Length) -> Self::Output {
        Length::from_meters(self * rhs.as_meters())
    }
}

impl Div<Time> for Length {
    type Output = Velocity;

    fn div(self, rhs: Time) -> Self::Output {
        Velocity::from_meters_per_second(self.as_meters() / rhs.as_secs())
    }
}

#[derive(Copy, Clone, PartialEq, PartialOrd)]
pub struct Angle {
    degrees: f64,
}

impl std::fmt::Debug for Angle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees)
    }
}

impl Angle {
    pub const fn from_degrees(degrees: f64) -> Angle {
        Angle { degrees }
    }

    pub fn from_radians(radians: f64) -> Angle {
        Angle {
            degrees: radians.to_degrees(),
        }
    }

    pub fn as_degrees(&self) -> f64 {
        self.degrees
    }

    pub fn as_radians(&self) -> f64 {
        self.degrees.to_radians()
    }
}

impl Add<Angle> for Angle {
    type Output = Angle;

    fn add(self, rhs: Angle) -> Self::Output {
        Angle::from_degrees(self.as_degrees() + rhs.as_degrees())
    }
}

impl Sub<Angle> for Angle {
    type Output = Angle;

    fn sub(self, rhs: Angle) -> Self::Output {
        Angle::from_degrees(self.as_degrees() - rhs.as_degrees())
    }
}

impl Neg for Angle {
    type Output = Angle;

    fn neg(self) -> Self::Output {
        Angle::from_degrees(-self.as_degrees())
    }
}

impl Mul<Angle> for f64 {
    type Output = Angle;

    fn mul(self, rhs: Angle) -> Self::Output {
        Angle::from_degrees(self * rhs.as_degrees())
    }
}

#[derive(Copy, Clone, PartialEq, PartialOrd)]
pub struct Time {
    seconds: f64,
}

impl std::fmt::Debug for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} s", self.seconds)
    }
}

impl Time {
    pub const fn from_secs(seconds: f64) -> Time {
        Time { seconds }
    }

    pub fn from_millis(millis: f64) -> Time {
        Time {
            seconds: millis / 1000.0,
        }
    }

    pub fn from_duration(duration: std::time::Duration) -> Time {
        Time {
            seconds: duration.as_secs_f64(),
        }
    }

    pub fn as_secs(&self) -> f64 {
        self.seconds
    }

    pub fn as_millis(&self) -> f64 {
        self.seconds * 1_000.0
    }

    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.seconds.max(0.0))
    }
}

impl Add<Time> for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Self::Output {
        Time::from_secs(self.as_secs() + rhs.as_secs())
    }
}

impl AddAssign<Time> for Time {
    fn add_assign(&mut self, rhs: Time) {
        self.seconds += rhs.as_secs()
    }
}

impl Sub<Time> for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Self::Output {
        Time::from_secs(self.as_secs() - rhs.as_secs())
    }
}

#[derive(Copy, Clone, PartialEq, PartialOrd)]
pub struct Velocity {
    meters_per_second: f64,
}

impl std::fmt::Debug for Velocity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} m·s⁻¹", self.meters_per_second)
    }
}

impl Velocity {
    pub const fn from_meters_per_second(meters_per_second: f64) -> Velocity {
        Velocity { meters_per_second }
    }

    pub fn as_meters_per_second(&self) -> f64 {
        self.meters_per_second
    }
}

impl Mul<Time> for Velocity {
    type Output = Length;

    fn mul(self, rhs: Time) -> Self::Output {
        Length::from_meters(self.as_meters_per_second() * rhs.as_secs())
    }
}
