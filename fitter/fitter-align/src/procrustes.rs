//! Closed-form optimal similarity transform between paired point sets.
//!
//! The rotation minimizing the weighted sum of squared residuals comes from
//! the SVD of the cross-covariance matrix (orthogonal Procrustes). When the
//! unconstrained optimum is a reflection, the policy is explicit: reject with
//! [`AlignError::MirrorRequired`], or, when the caller permits mirroring,
//! re-solve against mirrored source points and record the reflection in the
//! transform's mirror flag.

use crate::{AlignError, AlignResult, AlignmentTransform};
use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};

/// A source/target point pair used for rigid alignment.
///
/// Sources are points in the current model pose; targets are the data
/// positions they should land on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondencePair {
    /// Point in the current model pose.
    pub source: Point3<f64>,
    /// The data position the source should align to.
    pub target: Point3<f64>,
    /// Relative weight (default 1.0).
    pub weight: f64,
}

impl CorrespondencePair {
    /// Create an equally weighted pair.
    #[must_use]
    pub const fn new(source: Point3<f64>, target: Point3<f64>) -> Self {
        Self {
            source,
            target,
            weight: 1.0,
        }
    }

    /// Create a weighted pair.
    #[must_use]
    pub const fn weighted(source: Point3<f64>, target: Point3<f64>, weight: f64) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }

    /// Squared residual under a transform.
    #[must_use]
    pub fn squared_residual(&self, transform: &AlignmentTransform) -> f64 {
        (transform.transform_point(&self.source) - self.target).norm_squared()
    }
}

/// Weighted RMS residual of the pairs under a transform.
#[must_use]
pub fn rms_residual(pairs: &[CorrespondencePair], transform: &AlignmentTransform) -> f64 {
    let total_weight: f64 = pairs.iter().map(|p| p.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let sum: f64 = pairs
        .iter()
        .map(|p| p.weight * p.squared_residual(transform))
        .sum();
    (sum / total_weight).sqrt()
}

/// Compute the optimal similarity transform aligning sources to targets.
///
/// # Arguments
///
/// * `pairs` - Weighted correspondence pairs
/// * `with_scale` - Also compute the optimal uniform scale
/// * `allow_mirror` - Accept a reflected best fit by setting the transform's
///   mirror flag; otherwise a reflected optimum is an error
///
/// # Errors
///
/// * [`AlignError::EmptyInput`] for no pairs
/// * [`AlignError::InvalidParameter`] for a non-positive total weight
/// * [`AlignError::MirrorRequired`] when the optimum is a reflection and
///   mirroring is not allowed
/// * [`AlignError::SvdFailed`] when the SVD does not produce a usable
///   rotation
///
/// # Example
///
/// ```
/// use fitter_align::{compute_similarity_transform, CorrespondencePair};
/// use nalgebra::Point3;
///
/// let pairs = vec![
///     CorrespondencePair::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 3.0)),
///     CorrespondencePair::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 2.0, 3.0)),
///     CorrespondencePair::new(Point3::new(0.0, 1.0, 0.0), Point3::new(1.0, 3.0, 3.0)),
/// ];
///
/// let transform = compute_similarity_transform(&pairs, false, false).unwrap();
/// let aligned = transform.transform_point(&pairs[0].source);
/// assert!((aligned - pairs[0].target).norm() < 1e-9);
/// ```
pub fn compute_similarity_transform(
    pairs: &[CorrespondencePair],
    with_scale: bool,
    allow_mirror: bool,
) -> AlignResult<AlignmentTransform> {
    if pairs.is_empty() {
        return Err(AlignError::EmptyInput {
            what: "correspondence pairs",
        });
    }
    let total_weight: f64 = pairs.iter().map(|p| p.weight).sum();
    if total_weight <= 0.0 {
        return Err(AlignError::InvalidParameter(
            "total correspondence weight must be positive".to_string(),
        ));
    }

    match solve(pairs, total_weight, with_scale, false) {
        Err(AlignError::MirrorRequired) if allow_mirror => {
            solve(pairs, total_weight, with_scale, true)
        }
        other => other,
    }
}

/// One Procrustes solve; `mirrored` reflects the sources through the first
/// axis before solving and records the reflection in the result.
fn solve(
    pairs: &[CorrespondencePair],
    total_weight: f64,
    with_scale: bool,
    mirrored: bool,
) -> AlignResult<AlignmentTransform> {
    let reflect = |v: Vector3<f64>| {
        if mirrored {
            Vector3::new(-v.x, v.y, v.z)
        } else {
            v
        }
    };

    let source_centroid: Vector3<f64> = pairs
        .iter()
        .map(|p| p.weight * reflect(p.source.coords))
        .sum::<Vector3<f64>>()
        / total_weight;
    let target_centroid: Vector3<f64> = pairs
        .iter()
        .map(|p| p.weight * p.target.coords)
        .sum::<Vector3<f64>>()
        / total_weight;

    // Weighted cross-covariance H = sum(w * s_c * t_c^T)
    let mut h = Matrix3::zeros();
    for pair in pairs {
        let s = reflect(pair.source.coords) - source_centroid;
        let t = pair.target.coords - target_centroid;
        h += pair.weight * s * t.transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(AlignError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(AlignError::SvdFailed)?;

    let rotation_matrix = v_t.transpose() * u.transpose();
    if rotation_matrix.determinant() < 0.0 {
        // The unconstrained optimum is a reflection. The caller decides
        // whether to fold it into the mirror flag or reject.
        return Err(if mirrored {
            AlignError::SvdFailed
        } else {
            AlignError::MirrorRequired
        });
    }

    let rotation =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_matrix));

    let scale = if with_scale {
        let mut source_variance = 0.0;
        let mut cross_variance = 0.0;
        for pair in pairs {
            let s = reflect(pair.source.coords) - source_centroid;
            let t = pair.target.coords - target_centroid;
            source_variance += pair.weight * s.norm_squared();
            cross_variance += pair.weight * (rotation * s).dot(&t);
        }
        if source_variance > 1e-10 {
            cross_variance / source_variance
        } else {
            1.0
        }
    } else {
        1.0
    };

    let mut transform = AlignmentTransform::with_parts(rotation, Vector3::zeros(), scale, mirrored);
    // t = target_centroid - L * source_centroid, with the un-reflected
    // centroid: the transform's own mirror flag re-applies the reflection.
    let original_centroid = pairs
        .iter()
        .map(|p| p.weight * p.source.coords)
        .sum::<Vector3<f64>>()
        / total_weight;
    transform.translation = target_centroid - transform.transform_vector(&original_centroid);
    Ok(transform)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn triangle() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ]
    }

    fn pairs_under(
        points: &[Point3<f64>],
        map: impl Fn(&Point3<f64>) -> Point3<f64>,
    ) -> Vec<CorrespondencePair> {
        points
            .iter()
            .map(|p| CorrespondencePair::new(*p, map(p)))
            .collect()
    }

    #[test]
    fn pure_translation() {
        let offset = Vector3::new(5.0, 3.0, 2.0);
        let pairs = pairs_under(&triangle(), |p| p + offset);

        let t = compute_similarity_transform(&pairs, false, false).unwrap();
        assert!(t.rotation.angle() < 1e-9);
        assert_relative_eq!(t.translation, offset, epsilon = 1e-9);
        assert_relative_eq!(t.scale, 1.0, epsilon = 1e-9);
        assert!(!t.mirror);
    }

    #[test]
    fn rotation_and_translation() {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 3.0);
        let offset = Vector3::new(10.0, 5.0, -1.0);
        let pairs = pairs_under(&triangle(), |p| Point3::from(rotation * p.coords + offset));

        let t = compute_similarity_transform(&pairs, false, false).unwrap();
        for pair in &pairs {
            assert_relative_eq!(
                t.transform_point(&pair.source).coords,
                pair.target.coords,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn optimal_scale() {
        let scale = 2.5;
        let pairs = pairs_under(&triangle(), |p| Point3::from(p.coords * scale));

        let t = compute_similarity_transform(&pairs, true, false).unwrap();
        assert_relative_eq!(t.scale, scale, epsilon = 1e-9);
    }

    #[test]
    fn mirrored_data_rejected_by_default() {
        let pairs = pairs_under(&triangle(), |p| Point3::new(-p.x, p.y, p.z));
        let result = compute_similarity_transform(&pairs, false, false);
        assert!(matches!(result, Err(AlignError::MirrorRequired)));
    }

    #[test]
    fn mirrored_data_folds_into_mirror_flag() {
        let pairs = pairs_under(&triangle(), |p| Point3::new(-p.x, p.y, p.z));
        let t = compute_similarity_transform(&pairs, false, true).unwrap();

        assert!(t.mirror);
        // The rotation stays proper; the reflection lives in the flag.
        assert!(t.linear_matrix().determinant() < 0.0);
        for pair in &pairs {
            assert_relative_eq!(
                t.transform_point(&pair.source).coords,
                pair.target.coords,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn weighted_pairs_favor_heavy_correspondence() {
        let pairs = vec![
            CorrespondencePair::weighted(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                100.0,
            ),
            CorrespondencePair::weighted(
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(100.0, 0.0, 0.0),
                0.01,
            ),
        ];
        let t = compute_similarity_transform(&pairs, false, false).unwrap();
        assert!(t.translation.x > 0.9 && t.translation.x < 1.5);
    }

    #[test]
    fn empty_pairs_error() {
        let result = compute_similarity_transform(&[], false, false);
        assert!(matches!(result, Err(AlignError::EmptyInput { .. })));
    }

    #[test]
    fn nonpositive_weight_error() {
        let pairs = vec![CorrespondencePair::weighted(
            Point3::origin(),
            Point3::origin(),
            0.0,
        )];
        let result = compute_similarity_transform(&pairs, false, false);
        assert!(matches!(result, Err(AlignError::InvalidParameter(_))));
    }

    #[test]
    fn rms_residual_zero_for_exact_fit() {
        let offset = Vector3::new(1.0, 1.0, 1.0);
        let pairs = pairs_under(&triangle(), |p| p + offset);
        let t = compute_similarity_transform(&pairs, false, false).unwrap();
        assert!(rms_residual(&pairs, &t) < 1e-9);
    }
}
