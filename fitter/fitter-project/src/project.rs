//! The projection pass: every active data point onto the surface group.

use crate::closest::closest_on_element;
use crate::{ProjectError, ProjectResult, ProjectorParams};
use fitter_types::{
    CoordinateField, DataPointSet, DerivativeSlot, ElementShape, ScaffoldMesh, SurfaceGroup,
};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

/// Where a point landed on the surface group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionResult {
    /// Index of the data point in its set.
    pub point_index: usize,
    /// Id of the winning element.
    pub element_id: u32,
    /// Storage index of the winning element.
    pub element_index: usize,
    /// Local coordinates of the projection within the element.
    pub xi: [f64; 3],
    /// The projected position on the element.
    pub position: Point3<f64>,
    /// Residual vector: data point minus projection.
    pub residual: Vector3<f64>,
    /// Unsigned distance to the projection.
    pub distance: f64,
    /// Signed distance along the surface normal (2-D elements only).
    pub signed_distance: Option<f64>,
    /// Whether the local-coordinate search converged.
    pub converged: bool,
    /// Whether the point is excluded from the next solve. Set for distances
    /// beyond the outlier threshold and for diverged searches; re-evaluated
    /// every pass.
    pub outlier: bool,
}

impl ProjectionResult {
    /// Whether this projection feeds the solver (converged, not an outlier).
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.converged && !self.outlier
    }
}

/// Results of one projection pass.
///
/// `results` holds one entry per data point in set order; inactive points
/// are `None`. RMS and counts cover the accepted (converged, non-outlier)
/// projections.
#[derive(Debug, Clone)]
pub struct ProjectionPass {
    /// Per-point results, `None` for inactive points.
    pub results: Vec<Option<ProjectionResult>>,
    /// Number of accepted projections.
    pub accepted: usize,
    /// Number of points flagged as outliers this pass.
    pub outliers: usize,
    /// Number of points whose local search diverged this pass.
    pub diverged: usize,
    /// RMS distance over accepted projections.
    pub rms: f64,
}

impl ProjectionPass {
    /// Iterate over the accepted projections.
    pub fn accepted_results(&self) -> impl Iterator<Item = &ProjectionResult> {
        self.results
            .iter()
            .flatten()
            .filter(|r| r.is_accepted())
    }
}

/// Distances within this factor of the best are ties, resolved to the
/// lowest element id.
const TIE_EPSILON: f64 = 1e-9;

/// Project every active data point onto the surface group, keeping the
/// global minimum-distance location per point.
///
/// Candidate elements are swept in ascending storage index; a k-d tree over
/// element centroids supplies an initial distance bound, and a conservative
/// per-element radius prunes candidates that cannot beat it. Equal minimal
/// distances (within an epsilon) resolve to the lowest element id, so
/// identical inputs always produce identical results.
///
/// # Errors
///
/// * [`ProjectError::NoSurfaceElements`] when the resolved group is empty
/// * [`ProjectError::EmptyPointSet`] when no data point is active
/// * [`ProjectError::Mesh`] for unknown group ids or mesh/field mismatch
pub fn project_points(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    data: &DataPointSet,
    group: &SurfaceGroup,
    params: &ProjectorParams,
) -> ProjectResult<ProjectionPass> {
    let candidates = mesh.resolve_group(group)?;
    if candidates.is_empty() {
        return Err(ProjectError::NoSurfaceElements);
    }
    if data.active_count() == 0 {
        return Err(ProjectError::EmptyPointSet);
    }

    let geometry = CandidateGeometry::build(mesh, field, &candidates)?;

    debug!(
        elements = candidates.len(),
        points = data.active_count(),
        "starting projection pass"
    );

    let results: Vec<Option<ProjectionResult>> = (0..data.len())
        .into_par_iter()
        .map(|point_index| {
            if !data.is_active(point_index) {
                return Ok(None);
            }
            // Active points always resolve.
            let Some(point) = data.point(point_index) else {
                return Ok(None);
            };
            project_single(mesh, field, &geometry, point_index, &point, params).map(Some)
        })
        .collect::<ProjectResult<Vec<_>>>()?;

    let mut accepted = 0usize;
    let mut outliers = 0usize;
    let mut diverged = 0usize;
    let mut sum_sq = 0.0;
    for result in results.iter().flatten() {
        if !result.converged {
            diverged += 1;
        }
        if result.outlier {
            outliers += 1;
        }
        if result.is_accepted() {
            accepted += 1;
            sum_sq += result.distance * result.distance;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let rms = if accepted > 0 {
        (sum_sq / accepted as f64).sqrt()
    } else {
        0.0
    };

    info!(accepted, outliers, diverged, rms, "projection pass complete");

    Ok(ProjectionPass {
        results,
        accepted,
        outliers,
        diverged,
        rms,
    })
}

/// Project one point against the candidate set.
fn project_single(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    geometry: &CandidateGeometry,
    point_index: usize,
    point: &Point3<f64>,
    params: &ProjectorParams,
) -> ProjectResult<ProjectionResult> {
    // Seed the distance bound from the element with the nearest centroid.
    let nearest = geometry
        .tree
        .nearest_one::<SquaredEuclidean>(&[point.x, point.y, point.z]);
    #[allow(clippy::cast_possible_truncation)]
    let seed_slot = nearest.item as usize;
    let seed_index = geometry.candidates[seed_slot];

    let seed = closest_on_element(mesh, field, seed_index, point, params)?;
    let mut best_index = seed_index;
    let mut best = seed;
    let mut best_dist = (seed.position - point).norm();

    // Sweep every candidate in ascending storage index, pruning elements
    // whose centroid ball cannot beat the current best.
    for (slot, &element_index) in geometry.candidates.iter().enumerate() {
        if element_index == seed_index {
            continue;
        }
        let centroid_dist = (geometry.centroids[slot] - point).norm();
        if centroid_dist - geometry.radii[slot] > best_dist + TIE_EPSILON {
            continue;
        }

        let hit = closest_on_element(mesh, field, element_index, point, params)?;
        let dist = (hit.position - point).norm();

        let better = dist + TIE_EPSILON < best_dist;
        let tied_lower_id = (dist - best_dist).abs() <= TIE_EPSILON
            && element_id(mesh, element_index) < element_id(mesh, best_index);
        if better || tied_lower_id {
            best_index = element_index;
            best = hit;
            best_dist = dist;
        }
    }

    let residual = point - best.position;
    let signed_distance = surface_signed_distance(mesh, field, best_index, &best.xi, &residual);
    let outlier_by_distance = params
        .outlier_distance
        .is_some_and(|threshold| best_dist > threshold);

    Ok(ProjectionResult {
        point_index,
        element_id: element_id(mesh, best_index),
        element_index: best_index,
        xi: best.xi,
        position: best.position,
        residual,
        distance: best_dist,
        signed_distance,
        converged: best.converged,
        outlier: outlier_by_distance || !best.converged,
    })
}

fn element_id(mesh: &ScaffoldMesh, element_index: usize) -> u32 {
    mesh.element(element_index).map_or(u32::MAX, |e| e.id)
}

/// Signed distance along the surface normal for 2-D elements.
fn surface_signed_distance(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    element_index: usize,
    xi: &[f64; 3],
    residual: &Vector3<f64>,
) -> Option<f64> {
    let element = mesh.element(element_index)?;
    if element.dimension() != 2 {
        return None;
    }
    let jacobian = mesh.element_jacobian(element_index, field, xi).ok()?;
    let normal = jacobian[0].cross(&jacobian[1]);
    let norm = normal.norm();
    if norm < 1e-14 {
        return None;
    }
    Some(residual.dot(&normal) / norm)
}

/// Per-candidate centroids, conservative radii, and the centroid k-d tree.
struct CandidateGeometry {
    candidates: Vec<usize>,
    centroids: Vec<Point3<f64>>,
    radii: Vec<f64>,
    tree: KdTree<f64, 3>,
}

impl CandidateGeometry {
    fn build(
        mesh: &ScaffoldMesh,
        field: &CoordinateField,
        candidates: &[usize],
    ) -> ProjectResult<Self> {
        let mut centroids = Vec::with_capacity(candidates.len());
        let mut radii = Vec::with_capacity(candidates.len());
        let mut tree: KdTree<f64, 3> = KdTree::new();

        for (slot, &element_index) in candidates.iter().enumerate() {
            let centre = domain_centre(mesh, element_index);
            let centroid = mesh.element_position(element_index, field, &centre)?;
            let radius = bound_radius(mesh, field, element_index, &centroid);

            tree.add(&[centroid.x, centroid.y, centroid.z], slot as u64);
            centroids.push(centroid);
            radii.push(radius);
        }

        Ok(Self {
            candidates: candidates.to_vec(),
            centroids,
            radii,
            tree,
        })
    }
}

fn domain_centre(mesh: &ScaffoldMesh, element_index: usize) -> [f64; 3] {
    match mesh.element(element_index).map(|e| e.shape) {
        Some(ElementShape::Line) => [0.5, 0.0, 0.0],
        Some(ElementShape::Triangle) => [1.0 / 3.0, 1.0 / 3.0, 0.0],
        Some(ElementShape::Quad) => [0.5, 0.5, 0.0],
        Some(ElementShape::Tetrahedron) => [0.25, 0.25, 0.25],
        Some(ElementShape::Hexahedron) | None => [0.5, 0.5, 0.5],
    }
}

/// A radius certain to contain the element's geometric image.
///
/// Value-weight sums are bounded by 1.5 in magnitude across the supported
/// bases, and every derivative weight stays below 0.2, so the node-position
/// spread plus a scaled sum of derivative magnitudes over-estimates the
/// reachable set.
fn bound_radius(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    element_index: usize,
    centroid: &Point3<f64>,
) -> f64 {
    let Some(node_indices) = mesh.element_node_indices(element_index) else {
        return f64::INFINITY;
    };
    let Some(element) = mesh.element(element_index) else {
        return f64::INFINITY;
    };

    let mut value_spread = 0.0_f64;
    let mut derivative_sum = 0.0_f64;
    for &node_index in node_indices {
        let Some(params) = field.node(node_index) else {
            continue;
        };
        value_spread = value_spread.max((params.position - centroid).norm());
        for &slot in element.dof_slots() {
            if slot == DerivativeSlot::Value {
                continue;
            }
            derivative_sum += params.slot_vector(slot).norm();
        }
    }
    1.5 * value_spread + 0.2 * derivative_sum
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fitter_types::{Element, ElementBasis, Node};

    fn triangle_mesh() -> ScaffoldMesh {
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(1.0, 0.0, 0.0)),
            Node::at(3, Point3::new(0.0, 1.0, 0.0)),
        ];
        let elements = vec![Element::new(
            1,
            ElementShape::Triangle,
            ElementBasis::Linear,
            vec![1, 2, 3],
        )];
        ScaffoldMesh::new(nodes, elements).unwrap()
    }

    fn two_triangle_mesh() -> ScaffoldMesh {
        // Two coplanar triangles sharing the edge x = 0..1 at y = 0.
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(1.0, 0.0, 0.0)),
            Node::at(3, Point3::new(0.0, 1.0, 0.0)),
            Node::at(4, Point3::new(0.0, -1.0, 0.0)),
        ];
        let elements = vec![
            Element::new(1, ElementShape::Triangle, ElementBasis::Linear, vec![1, 2, 3]),
            Element::new(2, ElementShape::Triangle, ElementBasis::Linear, vec![1, 2, 4]),
        ];
        ScaffoldMesh::new(nodes, elements).unwrap()
    }

    #[test]
    fn planar_triangle_centroid_projection() {
        let mesh = triangle_mesh();
        let centroid = Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0);
        let data = DataPointSet::new(vec![Point3::new(centroid.x, centroid.y, 2.0)]);

        let pass = project_points(
            &mesh,
            mesh.reference_field(),
            &data,
            &SurfaceGroup::All,
            &ProjectorParams::default(),
        )
        .unwrap();

        let result = pass.results[0].unwrap();
        assert_relative_eq!(result.position.coords, centroid.coords, epsilon = 1e-12);
        assert_relative_eq!(result.distance, 2.0, epsilon = 1e-12);
        assert_relative_eq!(pass.rms, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn reruns_are_bit_identical() {
        let mesh = two_triangle_mesh();
        let data = DataPointSet::new(vec![
            Point3::new(0.3, 0.4, 1.0),
            Point3::new(0.2, -0.5, -0.7),
            Point3::new(5.0, 5.0, 5.0),
        ]);
        let params = ProjectorParams::default();

        let a = project_points(&mesh, mesh.reference_field(), &data, &SurfaceGroup::All, &params)
            .unwrap();
        let b = project_points(&mesh, mesh.reference_field(), &data, &SurfaceGroup::All, &params)
            .unwrap();

        for (ra, rb) in a.results.iter().zip(b.results.iter()) {
            let (ra, rb) = (ra.unwrap(), rb.unwrap());
            assert_eq!(ra.element_id, rb.element_id);
            assert_eq!(ra.position, rb.position);
            assert_eq!(ra.distance.to_bits(), rb.distance.to_bits());
        }
    }

    #[test]
    fn tie_breaks_to_lowest_element_id() {
        let mesh = two_triangle_mesh();
        // Equidistant from both triangles: directly above the shared edge.
        let data = DataPointSet::new(vec![Point3::new(0.5, 0.0, 1.0)]);

        let pass = project_points(
            &mesh,
            mesh.reference_field(),
            &data,
            &SurfaceGroup::All,
            &ProjectorParams::default(),
        )
        .unwrap();

        assert_eq!(pass.results[0].unwrap().element_id, 1);
    }

    #[test]
    fn outlier_threshold_flags_far_points() {
        let mesh = triangle_mesh();
        let data = DataPointSet::new(vec![
            Point3::new(0.2, 0.2, 0.1),
            Point3::new(0.2, 0.2, 50.0),
        ]);
        let params = ProjectorParams::new().with_outlier_distance(1.0);

        let pass = project_points(&mesh, mesh.reference_field(), &data, &SurfaceGroup::All, &params)
            .unwrap();

        assert!(!pass.results[0].unwrap().outlier);
        assert!(pass.results[1].unwrap().outlier);
        assert_eq!(pass.accepted, 1);
        assert_eq!(pass.outliers, 1);
        // RMS covers only the accepted point.
        assert_relative_eq!(pass.rms, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn inactive_points_are_skipped() {
        let mesh = triangle_mesh();
        let mut data = DataPointSet::new(vec![
            Point3::new(0.2, 0.2, 1.0),
            Point3::new(0.3, 0.3, 1.0),
        ]);
        data.set_active(0, false);

        let pass = project_points(
            &mesh,
            mesh.reference_field(),
            &data,
            &SurfaceGroup::All,
            &ProjectorParams::default(),
        )
        .unwrap();

        assert!(pass.results[0].is_none());
        assert!(pass.results[1].is_some());
    }

    #[test]
    fn empty_group_is_an_error() {
        let mesh = triangle_mesh();
        let data = DataPointSet::new(vec![Point3::new(0.0, 0.0, 1.0)]);
        let result = project_points(
            &mesh,
            mesh.reference_field(),
            &data,
            &SurfaceGroup::from_elements([]),
            &ProjectorParams::default(),
        );
        assert!(matches!(result, Err(ProjectError::NoSurfaceElements)));
    }

    #[test]
    fn no_active_points_is_an_error() {
        let mesh = triangle_mesh();
        let mut data = DataPointSet::new(vec![Point3::new(0.0, 0.0, 1.0)]);
        data.set_active(0, false);
        let result = project_points(
            &mesh,
            mesh.reference_field(),
            &data,
            &SurfaceGroup::All,
            &ProjectorParams::default(),
        );
        assert!(matches!(result, Err(ProjectError::EmptyPointSet)));
    }

    #[test]
    fn signed_distance_tracks_normal_side() {
        let mesh = triangle_mesh();
        let above = DataPointSet::new(vec![Point3::new(0.2, 0.2, 1.0)]);
        let below = DataPointSet::new(vec![Point3::new(0.2, 0.2, -1.0)]);
        let params = ProjectorParams::default();

        let pass_above =
            project_points(&mesh, mesh.reference_field(), &above, &SurfaceGroup::All, &params)
                .unwrap();
        let pass_below =
            project_points(&mesh, mesh.reference_field(), &below, &SurfaceGroup::All, &params)
                .unwrap();

        let sa = pass_above.results[0].unwrap().signed_distance.unwrap();
        let sb = pass_below.results[0].unwrap().signed_distance.unwrap();
        assert!(sa * sb < 0.0, "signs must differ: {sa} vs {sb}");
        assert_relative_eq!(sa.abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn pruning_agrees_with_exhaustive_sweep() {
        use rand::{Rng, SeedableRng};

        // A strip of triangles along x; random points must land on the same
        // element as a brute-force check.
        let mut nodes = Vec::new();
        let mut elements = Vec::new();
        for i in 0..10u32 {
            let x = f64::from(i);
            nodes.push(Node::at(2 * i + 1, Point3::new(x, 0.0, 0.0)));
            nodes.push(Node::at(2 * i + 2, Point3::new(x, 1.0, 0.0)));
        }
        for i in 0..9u32 {
            let base = 2 * i + 1;
            elements.push(Element::new(
                i + 1,
                ElementShape::Triangle,
                ElementBasis::Linear,
                vec![base, base + 2, base + 1],
            ));
        }
        let mesh = ScaffoldMesh::new(nodes, elements).unwrap();

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let points: Vec<Point3<f64>> = (0..50)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-1.0..10.0),
                    rng.gen_range(-1.0..2.0),
                    rng.gen_range(-2.0..2.0),
                )
            })
            .collect();
        let data = DataPointSet::new(points.clone());

        let pass = project_points(
            &mesh,
            mesh.reference_field(),
            &data,
            &SurfaceGroup::All,
            &ProjectorParams::default(),
        )
        .unwrap();

        for (i, point) in points.iter().enumerate() {
            let result = pass.results[i].unwrap();
            // Brute force over all elements.
            let mut best = f64::INFINITY;
            for e in 0..mesh.element_count() {
                let hit = crate::closest::closest_on_element(
                    &mesh,
                    mesh.reference_field(),
                    e,
                    point,
                    &ProjectorParams::default(),
                )
                .unwrap();
                best = best.min((hit.position - point).norm());
            }
            assert_relative_eq!(result.distance, best, epsilon = 1e-9);
        }
    }
}
