//! Station-keeping waypoint selection: hold behind the group, against its
//! direction of travel, far enough out to clear the most distant member.

use na::Point2;
use thiserror::Error;

use crate::geo::{normalize_bearing, rotate_about};
use crate::units::{Angle, Length};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Group travel direction is degenerate; destination centroid equals position centroid")]
    DegenerateDirection,
}

/// The last commanded station-keeping point. `heading_target` is the ground
/// point the observer faces while holding it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlannedWaypoint {
    pub position: Point2<f64>,
    pub heading_target: Point2<f64>,
}

#[derive(Debug)]
pub struct StandoffPlanner {
    margin: Length,
    waypoint: Option<PlannedWaypoint>,
}

impl StandoffPlanner {
    pub fn new(margin: Length) -> Self {
        StandoffPlanner {
            margin,
            waypoint: None,
        }
    }

    pub fn current(&self) -> Option<PlannedWaypoint> {
        self.waypoint
    }

    /// Plans the next waypoint, debounced: the stored waypoint is replaced
    /// only on the first planning cycle or when coverage demanded a
    /// reposition. A retained waypoint is returned unchanged even though
    /// fresher centroids are available, which damps oscillation from noisy
    /// estimates.
    pub fn plan(
        &mut self,
        position_centroid: Point2<f64>,
        destination_centroid: Point2<f64>,
        dmax: Length,
        reposition: bool,
    ) -> Result<PlannedWaypoint, PlanError> {
        if let Some(current) = self.waypoint {
            if !reposition {
                return Ok(current);
            }
        }
        let candidate = self.candidate(position_centroid, destination_centroid, dmax)?;
        self.waypoint = Some(candidate);
        Ok(candidate)
    }

    fn candidate(
        &self,
        position_centroid: Point2<f64>,
        destination_centroid: Point2<f64>,
        dmax: Length,
    ) -> Result<PlannedWaypoint, PlanError> {
        let direction = destination_centroid - position_centroid;
        if direction.norm() < 1e-9 {
            return Err(PlanError::DegenerateDirection);
        }
        let reverse = -direction;
        let theta = normalize_bearing(Angle::from_radians(reverse.y.atan2(reverse.x)));

        let standoff = dmax + self.margin;
        let offset = rotate_about(
            Point2::origin(),
            Point2::new(standoff.as_meters(), 0.0),
            theta,
        );

        Ok(PlannedWaypoint {
            position: position_centroid + offset.coords,
            heading_target: position_centroid,
        })
    }
}
