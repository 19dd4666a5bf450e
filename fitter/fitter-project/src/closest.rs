//! Closest point on a single element.
//!
//! Linear line, triangle, and tetrahedron elements have exact closed forms.
//! Every other basis minimizes the squared distance over the local
//! coordinates with a damped, domain-clamped Gauss-Newton iteration started
//! from the domain centre and corners.

use crate::ProjectorParams;
use fitter_types::{CoordinateField, ElementBasis, ElementShape, MeshResult, ScaffoldMesh};
use nalgebra::{Matrix3, Point3, Vector3};

/// The closest location found on one element.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LocalProjection {
    /// Local coordinates of the closest location.
    pub xi: [f64; 3],
    /// The closest position in space.
    pub position: Point3<f64>,
    /// Whether the local search converged (always true for closed forms).
    pub converged: bool,
}

/// Closest point on the element's geometric image to `point`.
pub(crate) fn closest_on_element(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    element_index: usize,
    point: &Point3<f64>,
    params: &ProjectorParams,
) -> MeshResult<LocalProjection> {
    // Validated meshes always have the element; the unwrap-free lookup keeps
    // the error path for misuse.
    let element = mesh.element(element_index).ok_or(
        fitter_types::MeshError::ElementIndexOutOfRange {
            index: element_index,
            count: mesh.element_count(),
        },
    )?;

    match (element.shape, element.basis) {
        (ElementShape::Line, ElementBasis::Linear) => closest_on_segment(mesh, field, element_index, point),
        (ElementShape::Triangle, ElementBasis::Linear) => {
            closest_on_linear_triangle(mesh, field, element_index, point)
        }
        (ElementShape::Tetrahedron, ElementBasis::Linear) => {
            closest_on_linear_tetrahedron(mesh, field, element_index, point)
        }
        (shape, _) => gauss_newton(mesh, field, element_index, shape, point, params),
    }
}

/// Exact projection onto a 2-node segment.
fn closest_on_segment(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    element_index: usize,
    point: &Point3<f64>,
) -> MeshResult<LocalProjection> {
    let a = mesh.element_position(element_index, field, &[0.0, 0.0, 0.0])?;
    let b = mesh.element_position(element_index, field, &[1.0, 0.0, 0.0])?;

    let ab = b - a;
    let denom = ab.norm_squared();
    let t = if denom > 0.0 {
        ((point - a).dot(&ab) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(LocalProjection {
        xi: [t, 0.0, 0.0],
        position: Point3::from(a.coords + ab * t),
        converged: true,
    })
}

/// Exact projection onto a linear triangle, via the barycentric region walk.
fn closest_on_linear_triangle(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    element_index: usize,
    point: &Point3<f64>,
) -> MeshResult<LocalProjection> {
    let a = mesh.element_position(element_index, field, &[0.0, 0.0, 0.0])?;
    let b = mesh.element_position(element_index, field, &[1.0, 0.0, 0.0])?;
    let c = mesh.element_position(element_index, field, &[0.0, 1.0, 0.0])?;

    let (position, u, v) = closest_point_on_triangle(*point, a, b, c);
    Ok(LocalProjection {
        xi: [u, v, 0.0],
        position,
        converged: true,
    })
}

/// Exact projection onto a linear tetrahedron: the point itself when inside,
/// otherwise the nearest of the four faces.
fn closest_on_linear_tetrahedron(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    element_index: usize,
    point: &Point3<f64>,
) -> MeshResult<LocalProjection> {
    let p0 = mesh.element_position(element_index, field, &[0.0, 0.0, 0.0])?;
    let p1 = mesh.element_position(element_index, field, &[1.0, 0.0, 0.0])?;
    let p2 = mesh.element_position(element_index, field, &[0.0, 1.0, 0.0])?;
    let p3 = mesh.element_position(element_index, field, &[0.0, 0.0, 1.0])?;

    // Barycentric solve: p - p0 = xi1*(p1-p0) + xi2*(p2-p0) + xi3*(p3-p0)
    let basis = Matrix3::from_columns(&[p1 - p0, p2 - p0, p3 - p0]);
    if let Some(inverse) = basis.try_inverse() {
        let xi = inverse * (point - p0);
        if xi.x >= 0.0 && xi.y >= 0.0 && xi.z >= 0.0 && xi.x + xi.y + xi.z <= 1.0 {
            return Ok(LocalProjection {
                xi: [xi.x, xi.y, xi.z],
                position: *point,
                converged: true,
            });
        }
    }

    // Outside (or degenerate): nearest of the four faces, mapped back into
    // tetrahedron coordinates. Faces listed with their barycentric embedding.
    let faces: [(Point3<f64>, Point3<f64>, Point3<f64>, [usize; 2]); 4] = [
        (p0, p1, p2, [0, 1]), // xi3 = 0: (u, v) -> xi1, xi2
        (p0, p1, p3, [0, 2]), // xi2 = 0: (u, v) -> xi1, xi3
        (p0, p2, p3, [1, 2]), // xi1 = 0: (u, v) -> xi2, xi3
        (p1, p2, p3, [9, 9]), // opposite face; handled below
    ];

    let mut best: Option<(f64, LocalProjection)> = None;
    for (a, b, c, map) in faces {
        let (position, u, v) = closest_point_on_triangle(*point, a, b, c);
        let mut xi = [0.0; 3];
        if map[0] == 9 {
            // Face p1-p2-p3: barycentric (1-u-v, u, v) over (p1, p2, p3).
            xi = [1.0 - u - v, u, v];
        } else {
            xi[map[0]] = u;
            xi[map[1]] = v;
        }
        let dist_sq = (position - point).norm_squared();
        if best.map_or(true, |(d, _)| dist_sq < d) {
            best = Some((
                dist_sq,
                LocalProjection {
                    xi,
                    position,
                    converged: true,
                },
            ));
        }
    }

    // The loop always runs; best is set.
    Ok(best.map_or(
        LocalProjection {
            xi: [0.0; 3],
            position: p0,
            converged: true,
        },
        |(_, projection)| projection,
    ))
}

/// Closest point on a triangle and its edge coordinates `(u, v)` with
/// `x = a + u*(b-a) + v*(c-a)`.
#[allow(clippy::many_single_char_names)]
fn closest_point_on_triangle(
    p: Point3<f64>,
    a: Point3<f64>,
    b: Point3<f64>,
    c: Point3<f64>,
) -> (Point3<f64>, f64, f64) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, 0.0, 0.0);
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, 1.0, 0.0);
    }

    let vc = d1.mul_add(d4, -(d3 * d2));
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (Point3::from(a.coords + ab * v), v, 0.0);
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, 0.0, 1.0);
    }

    let vb = d5.mul_add(d2, -(d1 * d6));
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (Point3::from(a.coords + ac * w), 0.0, w);
    }

    let va = d3.mul_add(d6, -(d5 * d4));
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (Point3::from(b.coords + (c - b) * w), 1.0 - w, w);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (Point3::from(a.coords + ab * v + ac * w), v, w)
}

/// Starting points for the Gauss-Newton search: domain centre plus corners.
fn starts_for(shape: ElementShape) -> Vec<[f64; 3]> {
    match shape {
        ElementShape::Line => vec![[0.5, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
        ElementShape::Triangle => vec![
            [1.0 / 3.0, 1.0 / 3.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        ElementShape::Quad => vec![
            [0.5, 0.5, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ],
        ElementShape::Tetrahedron => vec![
            [0.25, 0.25, 0.25],
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ],
        ElementShape::Hexahedron => {
            let mut starts = vec![[0.5, 0.5, 0.5]];
            for corner in 0..8u32 {
                starts.push([
                    f64::from(corner & 1),
                    f64::from((corner >> 1) & 1),
                    f64::from((corner >> 2) & 1),
                ]);
            }
            starts
        }
    }
}

/// Damped, domain-clamped Gauss-Newton minimization of the squared distance
/// over local coordinates.
fn gauss_newton(
    mesh: &ScaffoldMesh,
    field: &CoordinateField,
    element_index: usize,
    shape: ElementShape,
    point: &Point3<f64>,
    params: &ProjectorParams,
) -> MeshResult<LocalProjection> {
    let dim = shape.dimension();
    let mut best: Option<LocalProjection> = None;
    let mut best_dist_sq = f64::INFINITY;

    for start in starts_for(shape) {
        let mut xi = start;
        let mut position = mesh.element_position(element_index, field, &xi)?;
        let mut dist_sq = (position - point).norm_squared();
        let mut converged = false;

        for _ in 0..params.max_newton_iterations {
            let jacobian = mesh.element_jacobian(element_index, field, &xi)?;
            let residual = position - point;

            // Normal equations over the element dimension, padded to 3x3.
            let mut jtj = Matrix3::identity();
            let mut rhs = Vector3::zeros();
            for r in 0..dim {
                for c in 0..dim {
                    jtj[(r, c)] = jacobian[r].dot(&jacobian[c]);
                }
                rhs[r] = -jacobian[r].dot(&residual);
            }
            // Levenberg damping keeps degenerate Jacobians solvable.
            let damping = 1e-12 * (1.0 + jtj.trace());
            for d in 0..dim {
                jtj[(d, d)] += damping;
            }

            let Some(step) = jtj.lu().solve(&rhs) else {
                break;
            };

            // Backtrack until the step reduces the distance.
            let mut alpha = 1.0;
            let mut improved = false;
            let mut next_xi = xi;
            let mut next_position = position;
            let mut next_dist_sq = dist_sq;
            for _ in 0..8 {
                let mut trial = xi;
                for d in 0..dim {
                    trial[d] += alpha * step[d];
                }
                let trial = mesh.clamp_local(element_index, trial);
                let trial_position = mesh.element_position(element_index, field, &trial)?;
                let trial_dist_sq = (trial_position - point).norm_squared();
                if trial_dist_sq < dist_sq {
                    next_xi = trial;
                    next_position = trial_position;
                    next_dist_sq = trial_dist_sq;
                    improved = true;
                    break;
                }
                alpha *= 0.5;
            }

            if !improved {
                // No descent direction left: a clamped boundary minimum.
                converged = true;
                break;
            }

            let step_norm = {
                let mut sum = 0.0;
                for d in 0..dim {
                    let delta = next_xi[d] - xi[d];
                    sum += delta * delta;
                }
                sum.sqrt()
            };
            xi = next_xi;
            position = next_position;
            dist_sq = next_dist_sq;

            if step_norm < params.newton_tolerance {
                converged = true;
                break;
            }
        }

        if dist_sq < best_dist_sq {
            best_dist_sq = dist_sq;
            best = Some(LocalProjection {
                xi,
                position,
                converged,
            });
        } else if let Some(projection) = best.as_mut() {
            // Prefer a converged answer at equal distance.
            if converged && !projection.converged && (dist_sq - best_dist_sq).abs() < 1e-18 {
                projection.converged = true;
            }
        }
    }

    // At least one start always ran.
    Ok(best.map_or(
        LocalProjection {
            xi: [0.0; 3],
            position: *point,
            converged: false,
        },
        |projection| projection,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fitter_types::{Element, Node};

    fn quad_mesh() -> ScaffoldMesh {
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(1.0, 0.0, 0.0)),
            Node::at(3, Point3::new(0.0, 1.0, 0.0)),
            Node::at(4, Point3::new(1.0, 1.0, 0.0)),
        ];
        let elements = vec![Element::new(
            1,
            ElementShape::Quad,
            ElementBasis::Linear,
            vec![1, 2, 3, 4],
        )];
        ScaffoldMesh::new(nodes, elements).unwrap()
    }

    #[test]
    fn segment_interior_and_ends() {
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(2.0, 0.0, 0.0)),
        ];
        let elements = vec![Element::new(1, ElementShape::Line, ElementBasis::Linear, vec![1, 2])];
        let mesh = ScaffoldMesh::new(nodes, elements).unwrap();
        let params = ProjectorParams::default();

        let hit = closest_on_element(
            &mesh,
            mesh.reference_field(),
            0,
            &Point3::new(0.5, 1.0, 0.0),
            &params,
        )
        .unwrap();
        assert_relative_eq!(hit.xi[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(hit.position.x, 0.5, epsilon = 1e-12);

        let hit = closest_on_element(
            &mesh,
            mesh.reference_field(),
            0,
            &Point3::new(-5.0, 0.0, 0.0),
            &params,
        )
        .unwrap();
        assert_relative_eq!(hit.xi[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn triangle_interior_projection() {
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
        let mesh = ScaffoldMesh::new(nodes, elements).unwrap();

        let hit = closest_on_element(
            &mesh,
            mesh.reference_field(),
            0,
            &Point3::new(0.25, 0.25, 2.0),
            &ProjectorParams::default(),
        )
        .unwrap();
        assert_relative_eq!(hit.position.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(hit.xi[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(hit.xi[1], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn tetrahedron_inside_is_zero_distance() {
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(1.0, 0.0, 0.0)),
            Node::at(3, Point3::new(0.0, 1.0, 0.0)),
            Node::at(4, Point3::new(0.0, 0.0, 1.0)),
        ];
        let elements = vec![Element::new(
            1,
            ElementShape::Tetrahedron,
            ElementBasis::Linear,
            vec![1, 2, 3, 4],
        )];
        let mesh = ScaffoldMesh::new(nodes, elements).unwrap();

        let inside = Point3::new(0.2, 0.2, 0.2);
        let hit = closest_on_element(
            &mesh,
            mesh.reference_field(),
            0,
            &inside,
            &ProjectorParams::default(),
        )
        .unwrap();
        assert_relative_eq!((hit.position - inside).norm(), 0.0, epsilon = 1e-12);

        // Outside along -z projects onto the z = 0 face.
        let outside = Point3::new(0.2, 0.2, -1.0);
        let hit = closest_on_element(
            &mesh,
            mesh.reference_field(),
            0,
            &outside,
            &ProjectorParams::default(),
        )
        .unwrap();
        assert_relative_eq!(hit.position.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(hit.position.x, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn bilinear_quad_agrees_with_plane() {
        let mesh = quad_mesh();
        let hit = closest_on_element(
            &mesh,
            mesh.reference_field(),
            0,
            &Point3::new(0.3, 0.7, 1.5),
            &ProjectorParams::default(),
        )
        .unwrap();
        assert!(hit.converged);
        assert_relative_eq!(hit.position.x, 0.3, epsilon = 1e-8);
        assert_relative_eq!(hit.position.y, 0.7, epsilon = 1e-8);
        assert_relative_eq!(hit.position.z, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn quad_clamps_to_edge() {
        let mesh = quad_mesh();
        let hit = closest_on_element(
            &mesh,
            mesh.reference_field(),
            0,
            &Point3::new(2.0, 0.5, 0.0),
            &ProjectorParams::default(),
        )
        .unwrap();
        assert_relative_eq!(hit.xi[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(hit.position.x, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn gauss_newton_matches_exact_segment() {
        // A quadratic line whose midside node sits exactly halfway is the
        // straight segment; the curved-path search must agree with the
        // closed form.
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(0.5, 0.0, 0.0)),
            Node::at(3, Point3::new(1.0, 0.0, 0.0)),
        ];
        let elements = vec![Element::new(
            1,
            ElementShape::Line,
            ElementBasis::Quadratic,
            vec![1, 2, 3],
        )];
        let mesh = ScaffoldMesh::new(nodes, elements).unwrap();

        let hit = closest_on_element(
            &mesh,
            mesh.reference_field(),
            0,
            &Point3::new(0.75, 2.0, 0.0),
            &ProjectorParams::default(),
        )
        .unwrap();
        assert!(hit.converged);
        assert_relative_eq!(hit.position.x, 0.75, epsilon = 1e-8);
        assert_relative_eq!(hit.position.y, 0.0, epsilon = 1e-8);
    }
}
