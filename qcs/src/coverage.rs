//! Decides, per tick, whether every in-contact target is still inside the
//! camera footprint.

use parry2d_f64::math::Isometry;
use parry2d_f64::query::PointQuery;

use crate::camera::{Footprint, GeometryError};
use crate::geo::distance;
use crate::store::TargetStore;
use crate::units::Length;

/// Per-target footprint distances, recomputed every tick.
///
/// `signed_relative_distance` is the coverage decision variable: the
/// boundary distance, positive when the target is outside the footprint
/// and negated when it is inside.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CoverageInfo {
    pub distance_from_center: Length,
    pub distance_from_boundary: Length,
    pub distance_from_footprint: Length,
    pub signed_relative_distance: Length,
}

impl CoverageInfo {
    pub fn is_outside(&self) -> bool {
        self.signed_relative_distance.as_meters() > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct CoverageReport {
    pub per_target: Vec<(String, CoverageInfo)>,
    /// True when at least one in-contact target's margin-biased signed
    /// distance came out positive.
    pub reposition: bool,
}

#[derive(Debug)]
pub struct CoverageEvaluator {
    margin: Length,
}

impl CoverageEvaluator {
    pub fn new(margin: Length) -> Self {
        CoverageEvaluator { margin }
    }

    /// Evaluates every in-contact target against `footprint`, writing the
    /// distances back onto the target records. Targets with no known
    /// position are skipped, not counted against coverage.
    pub fn evaluate(
        &self,
        footprint: &Footprint,
        store: &mut TargetStore,
    ) -> Result<CoverageReport, GeometryError> {
        let polygon = footprint.to_polygon()?;
        let center = footprint.centroid();
        let identity = Isometry::identity();

        let mut per_target = Vec::new();
        let mut reposition = false;

        for target in store.iter_mut().filter(|t| t.in_contact) {
            let Some(position) = target.position else {
                continue;
            };

            let from_boundary = polygon.distance_to_point(&identity, &position, false);
            let from_footprint = polygon.distance_to_point(&identity, &position, true);
            let signed = if from_footprint != 0.0 {
                from_boundary
            } else {
                -from_boundary
            };

            let info = CoverageInfo {
                distance_from_center: distance(center, position),
                distance_from_boundary: Length::from_meters(from_boundary),
                distance_from_footprint: Length::from_meters(from_footprint),
                signed_relative_distance: Length::from_meters(signed),
            };
            target.coverage = Some(info);

            if (info.signed_relative_distance + self.margin).as_meters() > 0.0 {
                reposition = true;
            }
            per_target.push((target.name.clone(), info));
        }

        Ok(CoverageReport {
            per_target,
            reposition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use na::Point2;
    use qcoord_protocol::TargetTelemetry;

    // Axis-aligned 20x20 footprint centered on the origin.
    fn square_footprint() -> Footprint {
        Footprint {
            corners: [
                Point2::new(-10.0, -10.0),
                Point2::new(-10.0, 10.0),
                Point2::new(10.0, 10.0),
                Point2::new(10.0, -10.0),
            ],
        }
    }

    fn store_at(positions: &[(&str, f64, f64)]) -> TargetStore {
        let mut store = TargetStore::new(positions.iter().map(|(n, ..)| *n));
        for (name, x, y) in positions {
            store.apply(
                name,
                &TargetTelemetry {
                    pos_x: *x,
                    pos_y: *y,
                    dest_x: *x,
                    dest_y: *y,
                },
            );
        }
        store
    }

    #[test]
    fn interior_target_has_negative_signed_distance() {
        let evaluator = CoverageEvaluator::new(Length::from_meters(4.0));
        let mut store = store_at(&[("DJANGO", 0.0, 0.0)]);
        let report = evaluator
            .evaluate(&square_footprint(), &mut store)
            .unwrap();

        let (_, info) = &report.per_target[0];
        assert_relative_eq!(info.distance_from_footprint.as_meters(), 0.0);
        assert_relative_eq!(info.distance_from_boundary.as_meters(), 10.0);
        assert_relative_eq!(info.signed_relative_distance.as_meters(), -10.0);
        assert!(!info.is_outside());
        // 10 m inside the boundary is deeper than the 4 m bias
        assert!(!report.reposition);
        // Distances were written back to the store
        assert!(store.get("DJANGO").unwrap().coverage.is_some());
    }

    #[test]
    fn exterior_target_forces_reposition() {
        let evaluator = CoverageEvaluator::new(Length::from_meters(4.0));
        let mut store = store_at(&[("DJANGO", 0.0, 0.0), ("SUSAN", 30.0, 0.0)]);
        let report = evaluator
            .evaluate(&square_footprint(), &mut store)
            .unwrap();

        let info = store.get("SUSAN").unwrap().coverage.unwrap();
        assert_relative_eq!(info.distance_from_footprint.as_meters(), 20.0);
        assert_relative_eq!(info.signed_relative_distance.as_meters(), 20.0);
        assert!(info.is_outside());
        assert!(report.reposition);
    }

    #[test]
    fn boundary_target_yields_boundary_distance_and_repositions() {
        let evaluator = CoverageEvaluator::new(Length::from_meters(4.0));
        let mut store = store_at(&[("DJANGO", 10.0, 0.0)]);
        let report = evaluator
            .evaluate(&square_footprint(), &mut store)
            .unwrap();

        let info = store.get("DJANGO").unwrap().coverage.unwrap();
        assert_relative_eq!(info.distance_from_footprint.as_meters(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(
            info.signed_relative_distance.as_meters(),
            info.distance_from_boundary.as_meters(),
            epsilon = 1e-9
        );
        // The 4 m bias pushes the on-boundary case over the line
        assert!(report.reposition);
    }

    #[test]
    fn near_boundary_interior_target_triggers_early_reposition() {
        let evaluator = CoverageEvaluator::new(Length::from_meters(4.0));
        // 3 m inside the edge: signed is -3, bias makes it +1
        let mut store = store_at(&[("DJANGO", 7.0, 0.0)]);
        let report = evaluator
            .evaluate(&square_footprint(), &mut store)
            .unwrap();
        let info = store.get("DJANGO").unwrap().coverage.unwrap();
        assert!(!info.is_outside());
        assert!(report.reposition);
    }

    #[test]
    fn silent_targets_are_skipped() {
        let evaluator = CoverageEvaluator::new(Length::from_meters(4.0));
        // SILENT registered but never reported; it has no position and
        // must not count against coverage.
        let mut store = TargetStore::new(["SILENT"]);
        let report = evaluator
            .evaluate(&square_footprint(), &mut store)
            .unwrap();
        assert!(report.per_target.is_empty());
        assert!(!report.reposition);
    }

    #[test]
    fn distance_from_center_is_euclidean() {
        let evaluator = CoverageEvaluator::new(Length::from_meters(4.0));
        let mut store = store_at(&[("DJANGO", 3.0, 4.0)]);
        evaluator
            .evaluate(&square_footprint(), &mut store)
            .unwrap();
        let info = store.get("DJANGO").unwrap().coverage.unwrap();
        assert_relative_eq!(info.distance_from_center.as_meters(), 5.0);
    }
}
