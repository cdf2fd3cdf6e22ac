//! Group-level estimates over the in-contact targets: centroids, range
//! extremes, and a coarse speed-of-advance figure.

use na::{Point2, Vector2};
use ordered_float::OrderedFloat;
use thiserror::Error;

use crate::geo::distance;
use crate::store::{Target, TargetStore};
use crate::units::{Length, Time, Velocity};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Selector {
    Position,
    Destination,
}

impl Selector {
    fn pick(&self, target: &Target) -> Option<Point2<f64>> {
        match self {
            Selector::Position => target.position,
            Selector::Destination => target.destination,
        }
    }
}

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("No in-contact target has a known {0:?}")]
    InsufficientData(Selector),
}

/// Unweighted arithmetic centroid over the in-contact targets.
pub fn centroid(store: &TargetStore, selector: Selector) -> Result<Point2<f64>, EstimatorError> {
    let mut sum = Vector2::zeros();
    let mut count = 0usize;
    for point in store.in_contact().filter_map(|t| selector.pick(t)) {
        sum += point.coords;
        count += 1;
    }
    if count == 0 {
        return Err(EstimatorError::InsufficientData(selector));
    }
    Ok(Point2::from(sum / count as f64))
}

#[derive(Debug, Clone)]
pub struct RangedTarget {
    pub name: String,
    pub distance: Length,
}

#[derive(Debug, Clone)]
pub struct Extremes {
    pub farthest: RangedTarget,
    pub closest: RangedTarget,
}

/// Farthest and closest in-contact target from `reference`. `None` when no
/// in-contact target has a known position.
pub fn extremes(store: &TargetStore, reference: Point2<f64>) -> Option<Extremes> {
    let ranged: Vec<RangedTarget> = store
        .in_contact()
        .filter_map(|t| {
            t.position.map(|p| RangedTarget {
                name: t.name.clone(),
                distance: distance(reference, p),
            })
        })
        .collect();

    let farthest = ranged
        .iter()
        .max_by_key(|r| OrderedFloat(r.distance.as_meters()))?
        .clone();
    let closest = ranged
        .iter()
        .min_by_key(|r| OrderedFloat(r.distance.as_meters()))?
        .clone();
    Some(Extremes { farthest, closest })
}

/// Tracks the position centroid across planning cycles and reports the
/// group's speed of advance.
#[derive(Debug, Default)]
pub struct GroupMotion {
    previous: Option<(Point2<f64>, Time)>,
}

impl GroupMotion {
    pub fn observe(&mut self, centroid: Point2<f64>, now: Time) -> Option<Velocity> {
        let speed = self.previous.and_then(|(prev, prev_t)| {
            let dt = now - prev_t;
            if dt.as_secs() > 0.0 {
                Some(distance(prev, centroid) / dt)
            } else {
                None
            }
        });
        self.previous = Some((centroid, now));
        speed
    }
}
