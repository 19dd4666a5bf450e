//! Per-node coordinate fields.

use crate::{Aabb, NodeParameters};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A coordinate field: one [`NodeParameters`] entry per mesh node, in node
/// storage order.
///
/// The mesh's *reference* field is captured at construction and never
/// mutated; the *working* field is a clone the fitting engine deforms in
/// place. A field is only meaningful together with the mesh it was created
/// from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoordinateField {
    params: Vec<NodeParameters>,
}

impl CoordinateField {
    /// Create a field from per-node parameters.
    #[must_use]
    pub const fn new(params: Vec<NodeParameters>) -> Self {
        Self { params }
    }

    /// Number of node entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the field has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters of the node at a storage index.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&NodeParameters> {
        self.params.get(index)
    }

    /// Mutable parameters of the node at a storage index.
    #[must_use]
    pub fn node_mut(&mut self, index: usize) -> Option<&mut NodeParameters> {
        self.params.get_mut(index)
    }

    /// Iterate over node parameters in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeParameters> {
        self.params.iter()
    }

    /// Iterate mutably over node parameters in storage order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NodeParameters> {
        self.params.iter_mut()
    }

    /// Centroid of the node positions, or `None` for an empty field.
    #[must_use]
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.params.is_empty() {
            return None;
        }
        let sum: Vector3<f64> = self.params.iter().map(|p| p.position.coords).sum();
        #[allow(clippy::cast_precision_loss)]
        Some(Point3::from(sum / self.params.len() as f64))
    }

    /// Axis-aligned bounds of the node positions.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.params.iter().map(|p| &p.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn field(points: &[(f64, f64, f64)]) -> CoordinateField {
        CoordinateField::new(
            points
                .iter()
                .map(|&(x, y, z)| NodeParameters::new(Point3::new(x, y, z)))
                .collect(),
        )
    }

    #[test]
    fn centroid_of_points() {
        let f = field(&[(0.0, 0.0, 0.0), (2.0, 0.0, 0.0), (1.0, 3.0, 0.0)]);
        let c = f.centroid().unwrap();
        assert_relative_eq!(c.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_field_has_no_centroid() {
        assert!(field(&[]).centroid().is_none());
    }

    #[test]
    fn bounds_of_points() {
        let f = field(&[(0.0, 0.0, 0.0), (2.0, 5.0, -1.0)]);
        let b = f.bounds();
        assert_relative_eq!(b.max.y, 5.0, epsilon = 1e-12);
        assert_relative_eq!(b.min.z, -1.0, epsilon = 1e-12);
    }
}
