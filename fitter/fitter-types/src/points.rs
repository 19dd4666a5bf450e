//! Unordered data point sets.

use crate::Aabb;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An ordered set of raw 3D scan positions with no connectivity.
///
/// Each point carries an *active* flag; deactivated points are excluded from
/// centroid/size measures and from projection and fitting, but keep their
/// index so they can be re-activated later.
///
/// # Example
///
/// ```
/// use fitter_types::DataPointSet;
/// use nalgebra::Point3;
///
/// let mut data = DataPointSet::new(vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(2.0, 0.0, 0.0),
/// ]);
/// assert_eq!(data.active_count(), 2);
///
/// data.set_active(1, false);
/// assert_eq!(data.active_count(), 1);
/// assert!((data.centroid().unwrap().x - 0.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataPointSet {
    points: Vec<Point3<f64>>,
    active: Vec<bool>,
}

impl DataPointSet {
    /// Create a point set with every point active.
    #[must_use]
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        let active = vec![true; points.len()];
        Self { points, active }
    }

    /// Total number of points, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the set holds no points at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of active points.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// The point at an index, regardless of its active flag.
    #[must_use]
    pub fn point(&self, index: usize) -> Option<Point3<f64>> {
        self.points.get(index).copied()
    }

    /// Whether the point at an index is active. Out-of-range reads as inactive.
    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    /// Activate or deactivate a point. Out-of-range indices are ignored.
    pub fn set_active(&mut self, index: usize, active: bool) {
        if let Some(flag) = self.active.get_mut(index) {
            *flag = active;
        }
    }

    /// Iterate over `(index, position)` of the active points.
    pub fn active_points(&self) -> impl Iterator<Item = (usize, Point3<f64>)> + '_ {
        self.points
            .iter()
            .zip(self.active.iter())
            .enumerate()
            .filter_map(|(i, (p, &a))| a.then_some((i, *p)))
    }

    /// Centroid of the active points, or `None` when none are active.
    #[must_use]
    pub fn centroid(&self) -> Option<Point3<f64>> {
        let count = self.active_count();
        if count == 0 {
            return None;
        }
        let sum: Vector3<f64> = self.active_points().map(|(_, p)| p.coords).sum();
        #[allow(clippy::cast_precision_loss)]
        Some(Point3::from(sum / count as f64))
    }

    /// Axis-aligned bounds of the active points.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for (_, p) in self.active_points() {
            aabb.expand_to_include(&p);
        }
        aabb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn active_mask_excludes_points() {
        let mut data = DataPointSet::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
        ]);
        data.set_active(1, false);

        assert_eq!(data.len(), 2);
        assert_eq!(data.active_count(), 1);
        assert_relative_eq!(data.centroid().unwrap().x, 0.0, epsilon = 1e-12);
        assert!(data.bounds().max.x < 1.0);
    }

    #[test]
    fn reactivation_restores_point() {
        let mut data = DataPointSet::new(vec![Point3::new(1.0, 0.0, 0.0)]);
        data.set_active(0, false);
        assert!(data.centroid().is_none());
        data.set_active(0, true);
        assert_eq!(data.active_count(), 1);
    }

    #[test]
    fn empty_set() {
        let data = DataPointSet::new(Vec::new());
        assert!(data.is_empty());
        assert!(data.centroid().is_none());
        assert!(data.bounds().is_empty());
    }

    #[test]
    fn out_of_range_is_inactive() {
        let data = DataPointSet::new(vec![Point3::origin()]);
        assert!(!data.is_active(5));
        assert!(data.point(5).is_none());
    }
}
