//! The scaffold mesh: validated topology plus geometric evaluation.

use crate::basis;
use crate::{
    Aabb, BasisEval, CoordinateField, Element, MeshError, MeshResult, Node, SurfaceGroup,
};
use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

/// A validated node/element mesh.
///
/// Construction checks the structural invariants once — unique ids, resolvable
/// node references, shape/basis support, node counts, and presence of the
/// derivative parameters each element's basis reads — so evaluation never has
/// to re-validate. The node coordinates present at construction are captured
/// as the frozen *reference field*; callers clone it to obtain a mutable
/// working field.
///
/// # Example
///
/// ```
/// use fitter_types::{Element, ElementBasis, ElementShape, Node, ScaffoldMesh};
/// use nalgebra::Point3;
///
/// let nodes = vec![
///     Node::at(1, Point3::new(0.0, 0.0, 0.0)),
///     Node::at(2, Point3::new(1.0, 0.0, 0.0)),
///     Node::at(3, Point3::new(0.0, 1.0, 0.0)),
/// ];
/// let elements = vec![Element::new(
///     1,
///     ElementShape::Triangle,
///     ElementBasis::Linear,
///     vec![1, 2, 3],
/// )];
/// let mesh = ScaffoldMesh::new(nodes, elements).unwrap();
/// assert_eq!(mesh.node_count(), 3);
/// assert_eq!(mesh.element_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ScaffoldMesh {
    nodes: Vec<Node>,
    elements: Vec<Element>,
    /// node id -> storage index
    node_index: HashMap<u32, usize>,
    /// element id -> storage index
    element_index: HashMap<u32, usize>,
    /// Per element, the node storage indices in local order.
    element_node_indices: Vec<Vec<usize>>,
    /// Frozen copy of the node parameters at construction time.
    reference: CoordinateField,
}

impl ScaffoldMesh {
    /// Build a mesh from nodes and elements, validating all invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`MeshError`] for duplicate ids, unresolvable node
    /// references, unsupported shape/basis pairs, wrong node counts, or
    /// missing derivative parameters.
    pub fn new(nodes: Vec<Node>, elements: Vec<Element>) -> MeshResult<Self> {
        let mut node_index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node_index.insert(node.id, i).is_some() {
                return Err(MeshError::DuplicateNodeId { id: node.id });
            }
        }

        let mut element_index = HashMap::with_capacity(elements.len());
        let mut element_node_indices = Vec::with_capacity(elements.len());
        for (i, element) in elements.iter().enumerate() {
            if element_index.insert(element.id, i).is_some() {
                return Err(MeshError::DuplicateElementId { id: element.id });
            }
            if !element.basis.supports(element.shape) {
                return Err(MeshError::UnsupportedBasis {
                    element: element.id,
                });
            }
            let expected = element.basis.node_count(element.shape);
            if element.nodes.len() != expected {
                return Err(MeshError::NodeCountMismatch {
                    element: element.id,
                    expected,
                    got: element.nodes.len(),
                });
            }

            let mut local = Vec::with_capacity(element.nodes.len());
            for &node_id in &element.nodes {
                let Some(&idx) = node_index.get(&node_id) else {
                    return Err(MeshError::UnknownNode {
                        element: element.id,
                        node: node_id,
                    });
                };
                for &slot in element.dof_slots() {
                    if !nodes[idx].params.has_slot(slot) {
                        return Err(MeshError::MissingDerivative {
                            element: element.id,
                            node: node_id,
                            slot,
                        });
                    }
                }
                local.push(idx);
            }
            element_node_indices.push(local);
        }

        let reference = CoordinateField::new(nodes.iter().map(|n| n.params.clone()).collect());

        Ok(Self {
            nodes,
            elements,
            node_index,
            element_index,
            element_node_indices,
            reference,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// The nodes in storage order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The elements in storage order.
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// The element at a storage index.
    #[must_use]
    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Storage index of a node id.
    #[must_use]
    pub fn node_storage_index(&self, id: u32) -> Option<usize> {
        self.node_index.get(&id).copied()
    }

    /// Storage index of an element id.
    #[must_use]
    pub fn element_storage_index(&self, id: u32) -> Option<usize> {
        self.element_index.get(&id).copied()
    }

    /// Node storage indices of an element, in local order.
    #[must_use]
    pub fn element_node_indices(&self, element_index: usize) -> Option<&[usize]> {
        self.element_node_indices
            .get(element_index)
            .map(Vec::as_slice)
    }

    /// The frozen reference coordinate field captured at construction.
    #[must_use]
    pub const fn reference_field(&self) -> &CoordinateField {
        &self.reference
    }

    /// A fresh working field, initialized from the reference field.
    #[must_use]
    pub fn working_field(&self) -> CoordinateField {
        self.reference.clone()
    }

    /// Bounds of the reference node positions.
    #[must_use]
    pub fn reference_bounds(&self) -> Aabb {
        self.reference.bounds()
    }

    /// Evaluate the basis of an element at local coordinates.
    ///
    /// # Errors
    ///
    /// [`MeshError::ElementIndexOutOfRange`] for a bad index.
    pub fn element_basis(&self, element_index: usize, xi: &[f64; 3]) -> MeshResult<BasisEval> {
        let element = self.elements.get(element_index).ok_or_else(|| {
            MeshError::ElementIndexOutOfRange {
                index: element_index,
                count: self.elements.len(),
            }
        })?;
        Ok(basis::evaluate(element.shape, element.basis, xi))
    }

    /// Interpolated position of an element at local coordinates, evaluated
    /// against the given coordinate field.
    ///
    /// # Errors
    ///
    /// [`MeshError::ElementIndexOutOfRange`] for a bad index,
    /// [`MeshError::FieldSizeMismatch`] when the field does not match the mesh.
    pub fn element_position(
        &self,
        element_index: usize,
        field: &CoordinateField,
        xi: &[f64; 3],
    ) -> MeshResult<Point3<f64>> {
        self.check_field(field)?;
        let eval = self.element_basis(element_index, xi)?;
        Ok(Point3::from(self.accumulate(element_index, field, &eval.weights)))
    }

    /// Derivatives of the element position with respect to each local
    /// coordinate direction, evaluated against the given field.
    ///
    /// Only the first `dimension()` columns are meaningful; trailing columns
    /// are zero.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ScaffoldMesh::element_position`].
    pub fn element_jacobian(
        &self,
        element_index: usize,
        field: &CoordinateField,
        xi: &[f64; 3],
    ) -> MeshResult<[Vector3<f64>; 3]> {
        self.check_field(field)?;
        let eval = self.element_basis(element_index, xi)?;
        let mut columns = [Vector3::zeros(); 3];
        for (k, column) in columns.iter_mut().enumerate() {
            let weights: Vec<f64> = eval.gradients.iter().map(|g| g[k]).collect();
            *column = self.accumulate(element_index, field, &weights);
        }
        Ok(columns)
    }

    /// Clamp local coordinates into an element's valid domain.
    #[must_use]
    pub fn clamp_local(&self, element_index: usize, xi: [f64; 3]) -> [f64; 3] {
        self.elements
            .get(element_index)
            .map_or(xi, |e| crate::element::clamp_local(e.shape, xi))
    }

    /// Resolve a surface group into ascending element storage indices.
    ///
    /// Unknown element ids are reported, not skipped; the ascending order
    /// makes downstream sweeps deterministic.
    ///
    /// # Errors
    ///
    /// [`MeshError::UnknownElement`] when the group names an id the mesh
    /// does not contain.
    pub fn resolve_group(&self, group: &SurfaceGroup) -> MeshResult<Vec<usize>> {
        match group {
            SurfaceGroup::All => Ok((0..self.elements.len()).collect()),
            SurfaceGroup::Elements(ids) => {
                let mut indices = Vec::with_capacity(ids.len());
                for &id in ids {
                    match self.element_index.get(&id) {
                        Some(&idx) => indices.push(idx),
                        None => return Err(MeshError::UnknownElement { id }),
                    }
                }
                indices.sort_unstable();
                indices.dedup();
                Ok(indices)
            }
        }
    }

    /// Weighted sum of the element's DOF vectors.
    ///
    /// `weights` must hold one entry per (local node, slot) pair, slot index
    /// fastest, as produced by basis evaluation.
    fn accumulate(
        &self,
        element_index: usize,
        field: &CoordinateField,
        weights: &[f64],
    ) -> Vector3<f64> {
        let element = &self.elements[element_index];
        let slots = element.dof_slots();
        let node_indices = &self.element_node_indices[element_index];

        let mut sum = Vector3::zeros();
        for (local, &node_idx) in node_indices.iter().enumerate() {
            // Validated at construction: field length matches, slots present.
            let Some(params) = field.node(node_idx) else {
                continue;
            };
            for (s, &slot) in slots.iter().enumerate() {
                let w = weights[local * slots.len() + s];
                if w != 0.0 {
                    sum += w * params.slot_vector(slot);
                }
            }
        }
        sum
    }

    fn check_field(&self, field: &CoordinateField) -> MeshResult<()> {
        if field.len() == self.nodes.len() {
            Ok(())
        } else {
            Err(MeshError::FieldSizeMismatch {
                field_len: field.len(),
                node_count: self.nodes.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DerivativeSlot, ElementBasis, ElementShape, NodeParameters};
    use approx::assert_relative_eq;

    fn line_mesh() -> ScaffoldMesh {
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(1.0, 0.0, 0.0)),
        ];
        let elements = vec![Element::new(
            1,
            ElementShape::Line,
            ElementBasis::Linear,
            vec![1, 2],
        )];
        ScaffoldMesh::new(nodes, elements).unwrap()
    }

    #[test]
    fn duplicate_node_id_rejected() {
        let nodes = vec![Node::at(1, Point3::origin()), Node::at(1, Point3::origin())];
        let result = ScaffoldMesh::new(nodes, Vec::new());
        assert!(matches!(result, Err(MeshError::DuplicateNodeId { id: 1 })));
    }

    #[test]
    fn unknown_node_rejected() {
        let nodes = vec![Node::at(1, Point3::origin()), Node::at(2, Point3::origin())];
        let elements = vec![Element::new(
            7,
            ElementShape::Line,
            ElementBasis::Linear,
            vec![1, 99],
        )];
        let result = ScaffoldMesh::new(nodes, elements);
        assert!(matches!(
            result,
            Err(MeshError::UnknownNode {
                element: 7,
                node: 99
            })
        ));
    }

    #[test]
    fn node_count_mismatch_rejected() {
        let nodes = vec![Node::at(1, Point3::origin())];
        let elements = vec![Element::new(
            1,
            ElementShape::Line,
            ElementBasis::Linear,
            vec![1],
        )];
        assert!(matches!(
            ScaffoldMesh::new(nodes, elements),
            Err(MeshError::NodeCountMismatch { expected: 2, .. })
        ));
    }

    #[test]
    fn unsupported_basis_rejected() {
        let nodes = vec![
            Node::at(1, Point3::origin()),
            Node::at(2, Point3::origin()),
            Node::at(3, Point3::origin()),
        ];
        let elements = vec![Element::new(
            1,
            ElementShape::Triangle,
            ElementBasis::CubicHermite,
            vec![1, 2, 3],
        )];
        assert!(matches!(
            ScaffoldMesh::new(nodes, elements),
            Err(MeshError::UnsupportedBasis { element: 1 })
        ));
    }

    #[test]
    fn hermite_requires_derivatives() {
        let nodes = vec![Node::at(1, Point3::origin()), Node::at(2, Point3::origin())];
        let elements = vec![Element::new(
            1,
            ElementShape::Line,
            ElementBasis::CubicHermite,
            vec![1, 2],
        )];
        assert!(matches!(
            ScaffoldMesh::new(nodes, elements),
            Err(MeshError::MissingDerivative {
                slot: DerivativeSlot::D1,
                ..
            })
        ));
    }

    #[test]
    fn linear_interpolation() {
        let mesh = line_mesh();
        let p = mesh
            .element_position(0, mesh.reference_field(), &[0.25, 0.0, 0.0])
            .unwrap();
        assert_relative_eq!(p.x, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn jacobian_of_line() {
        let mesh = line_mesh();
        let j = mesh
            .element_jacobian(0, mesh.reference_field(), &[0.5, 0.0, 0.0])
            .unwrap();
        assert_relative_eq!(j[0].x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(j[1].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn hermite_straight_line_midpoint() {
        // A Hermite line with unit tangents at both ends is the straight
        // segment, so the midpoint interpolates exactly.
        let d1 = nalgebra::Vector3::new(1.0, 0.0, 0.0);
        let nodes = vec![
            Node::new(
                1,
                NodeParameters::new(Point3::new(0.0, 0.0, 0.0)).with_derivative(DerivativeSlot::D1, d1),
            ),
            Node::new(
                2,
                NodeParameters::new(Point3::new(1.0, 0.0, 0.0)).with_derivative(DerivativeSlot::D1, d1),
            ),
        ];
        let elements = vec![Element::new(
            1,
            ElementShape::Line,
            ElementBasis::CubicHermite,
            vec![1, 2],
        )];
        let mesh = ScaffoldMesh::new(nodes, elements).unwrap();
        let p = mesh
            .element_position(0, mesh.reference_field(), &[0.5, 0.0, 0.0])
            .unwrap();
        assert_relative_eq!(p.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn resolve_group_all_and_subset() {
        let mesh = line_mesh();
        assert_eq!(mesh.resolve_group(&SurfaceGroup::All).unwrap(), vec![0]);
        assert_eq!(
            mesh.resolve_group(&SurfaceGroup::from_elements([1])).unwrap(),
            vec![0]
        );
        assert!(matches!(
            mesh.resolve_group(&SurfaceGroup::from_elements([9])),
            Err(MeshError::UnknownElement { id: 9 })
        ));
    }

    #[test]
    fn field_size_checked() {
        let mesh = line_mesh();
        let short = CoordinateField::new(vec![NodeParameters::new(Point3::origin())]);
        assert!(matches!(
            mesh.element_position(0, &short, &[0.5, 0.0, 0.0]),
            Err(MeshError::FieldSizeMismatch { .. })
        ));
    }
}
