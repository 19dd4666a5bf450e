//! The rigid similarity transform estimated by alignment.

use nalgebra::{Matrix3, Matrix4, Point3, Quaternion, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rigid similarity transform: rotation, translation, uniform scale, and an
/// optional mirror.
///
/// Points map as `x' = scale * R * M * x + t`, where `M` reflects the first
/// axis when the mirror flag is set and is the identity otherwise. The
/// rotation is always proper (determinant +1); a reflected best fit is
/// represented by the mirror flag, never by an improper rotation.
///
/// # Example
///
/// ```
/// use fitter_align::AlignmentTransform;
/// use nalgebra::{Point3, UnitQuaternion, Vector3};
/// use std::f64::consts::PI;
///
/// let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.0);
/// let transform = AlignmentTransform::new(rotation, Vector3::new(1.0, 0.0, 0.0));
///
/// let p = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert!((p.x - 1.0).abs() < 1e-12);
/// assert!((p.y - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlignmentTransform {
    /// Rotation as a unit quaternion (always proper).
    pub rotation: UnitQuaternion<f64>,
    /// Translation vector.
    pub translation: Vector3<f64>,
    /// Uniform scale factor.
    pub scale: f64,
    /// Whether the first axis is reflected before rotation.
    pub mirror: bool,
}

impl Default for AlignmentTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AlignmentTransform {
    /// Create a transform with the given rotation and translation.
    #[must_use]
    pub const fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
            scale: 1.0,
            mirror: false,
        }
    }

    /// Create a transform from all four parts.
    #[must_use]
    pub const fn with_parts(
        rotation: UnitQuaternion<f64>,
        translation: Vector3<f64>,
        scale: f64,
        mirror: bool,
    ) -> Self {
        Self {
            rotation,
            translation,
            scale,
            mirror,
        }
    }

    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
            scale: 1.0,
            mirror: false,
        }
    }

    /// A pure translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// A pure rotation.
    #[must_use]
    pub fn from_rotation(rotation: UnitQuaternion<f64>) -> Self {
        Self {
            rotation,
            ..Self::identity()
        }
    }

    /// A pure uniform scale.
    #[must_use]
    pub fn from_scale(scale: f64) -> Self {
        Self {
            scale,
            ..Self::identity()
        }
    }

    /// Apply the linear part (scale, mirror, rotation) to a vector.
    #[must_use]
    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        let reflected = if self.mirror {
            Vector3::new(-vector.x, vector.y, vector.z)
        } else {
            *vector
        };
        self.rotation * (reflected * self.scale)
    }

    /// Apply the full transform to a point.
    #[must_use]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.transform_vector(&point.coords) + self.translation)
    }

    /// The linear part as a 3x3 matrix (`scale * R * M`).
    #[must_use]
    pub fn linear_matrix(&self) -> Matrix3<f64> {
        let mut m = self.rotation.to_rotation_matrix().into_inner() * self.scale;
        if self.mirror {
            // M negates the first input axis, i.e. the first column of R.
            for i in 0..3 {
                m[(i, 0)] = -m[(i, 0)];
            }
        }
        m
    }

    /// Compose this transform with another (`self * other`): `other` is
    /// applied first.
    ///
    /// Mirrors compose by conjugating the inner rotation through the outer
    /// reflection, keeping both rotations proper.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        let inner_rotation = if self.mirror {
            conjugate_by_mirror(&other.rotation)
        } else {
            other.rotation
        };
        Self {
            rotation: self.rotation * inner_rotation,
            translation: self.translation + self.transform_vector(&other.translation),
            scale: self.scale * other.scale,
            mirror: self.mirror ^ other.mirror,
        }
    }

    /// The inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rotation = if self.mirror {
            conjugate_by_mirror(&self.rotation.inverse())
        } else {
            self.rotation.inverse()
        };
        let mut inverse = Self {
            rotation: inv_rotation,
            translation: Vector3::zeros(),
            scale: 1.0 / self.scale,
            mirror: self.mirror,
        };
        inverse.translation = -inverse.transform_vector(&self.translation);
        inverse
    }

    /// Convert to a 4x4 homogeneous matrix.
    #[must_use]
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        let linear = self.linear_matrix();
        let mut mat = Matrix4::identity();
        for i in 0..3 {
            for j in 0..3 {
                mat[(i, j)] = linear[(i, j)];
            }
            mat[(i, 3)] = self.translation[i];
        }
        mat
    }

    /// Rotation decomposed into Euler angles.
    ///
    /// The convention matches `UnitQuaternion::euler_angles`:
    /// `R = Rz(yaw) * Ry(pitch) * Rx(roll)`, returned as
    /// `(roll, pitch, yaw)`.
    #[must_use]
    pub fn euler_angles(&self) -> (f64, f64, f64) {
        self.rotation.euler_angles()
    }

    /// Replace the rotation from Euler angles in the same convention as
    /// [`AlignmentTransform::euler_angles`].
    pub fn set_euler_angles(&mut self, roll: f64, pitch: f64, yaw: f64) {
        self.rotation = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
    }

    /// Whether the transform is approximately the identity.
    #[must_use]
    pub fn is_identity(&self, epsilon: f64) -> bool {
        !self.mirror
            && self.rotation.angle().abs() < epsilon
            && self.translation.norm() < epsilon
            && (self.scale - 1.0).abs() < epsilon
    }
}

/// Conjugate a rotation by the first-axis reflection: `M * R * M`.
///
/// For a quaternion `(w, x, y, z)` this is `(w, x, -y, -z)`, still a proper
/// rotation.
fn conjugate_by_mirror(rotation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let q = rotation.quaternion();
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.i, -q.j, -q.k))
}
