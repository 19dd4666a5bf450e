//! Interactive estimation and editing of the alignment transform.

use crate::{
    compute_similarity_transform, rms_residual, AlignError, AlignResult, AlignmentTransform,
    CorrespondencePair,
};
use fitter_types::{CoordinateField, DataPointSet, DerivativeSlot};
use nalgebra::{Matrix3, Point3, Vector3};
use tracing::debug;

/// Observer invoked synchronously after any state-mutating estimator call.
pub type ChangeCallback = Box<dyn FnMut(&AlignmentTransform) + Send>;

/// A pair of coordinate axes to swap in the model frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisPair {
    /// Swap the X and Y axes.
    Xy,
    /// Swap the Y and Z axes.
    Yz,
    /// Swap the X and Z axes.
    Xz,
}

impl AxisPair {
    /// The permutation matrix for this swap.
    #[must_use]
    pub fn matrix(self) -> Matrix3<f64> {
        let mut m = Matrix3::identity();
        let (a, b) = match self {
            Self::Xy => (0, 1),
            Self::Yz => (1, 2),
            Self::Xz => (0, 2),
        };
        m[(a, a)] = 0.0;
        m[(b, b)] = 0.0;
        m[(a, b)] = 1.0;
        m[(b, a)] = 1.0;
        m
    }
}

/// Outcome of a rigid alignment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RigidAlignOutcome {
    /// The transform was updated; the residual did not increase.
    Improved {
        /// Weighted RMS residual before the step.
        rms_before: f64,
        /// Weighted RMS residual after the step.
        rms_after: f64,
    },
    /// The solve would have increased the residual; the prior transform was
    /// kept and no observer fired.
    Unchanged {
        /// Weighted RMS residual of the retained transform.
        rms: f64,
    },
}

/// Produces and maintains the rigid similarity transform mapping reference
/// mesh space into data space.
///
/// The estimator owns the current [`AlignmentTransform`], an optional
/// axis-swap permutation applied to model coordinates before the similarity
/// transform, and a single change observer that fires after every
/// state-mutating call.
///
/// # Example
///
/// ```
/// use fitter_align::AlignmentEstimator;
/// use fitter_types::{CoordinateField, DataPointSet, NodeParameters};
/// use nalgebra::Point3;
///
/// let model = CoordinateField::new(vec![
///     NodeParameters::new(Point3::new(0.0, 0.0, 0.0)),
///     NodeParameters::new(Point3::new(1.0, 0.0, 0.0)),
/// ]);
/// let data = DataPointSet::new(vec![Point3::new(0.5, 1.0, 0.0)]);
///
/// let mut estimator = AlignmentEstimator::new();
/// estimator.auto_centre(&model, &data).unwrap();
/// assert!((estimator.offset().y - 1.0).abs() < 1e-12);
/// ```
pub struct AlignmentEstimator {
    transform: AlignmentTransform,
    /// Composed axis-swap permutation applied to model coordinates before
    /// the similarity transform. Repeated swaps compound.
    axis_swap: Matrix3<f64>,
    mirror_enabled: bool,
    callback: Option<ChangeCallback>,
}

impl std::fmt::Debug for AlignmentEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentEstimator")
            .field("transform", &self.transform)
            .field("axis_swap", &self.axis_swap)
            .field("mirror_enabled", &self.mirror_enabled)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Default for AlignmentEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl AlignmentEstimator {
    /// Threshold below which a measured model size cannot seed a scale.
    pub const DEGENERATE_SIZE: f64 = 1e-12;

    /// Create an estimator with the identity transform.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transform: AlignmentTransform::identity(),
            axis_swap: Matrix3::identity(),
            mirror_enabled: false,
            callback: None,
        }
    }

    /// The current transform.
    #[must_use]
    pub const fn transform(&self) -> &AlignmentTransform {
        &self.transform
    }

    /// Enable or disable folding reflected best fits into the mirror flag.
    ///
    /// While disabled, a reflected best-fit rotation makes
    /// [`AlignmentEstimator::rigid_align`] fail with
    /// [`AlignError::MirrorRequired`].
    pub fn set_mirror_enabled(&mut self, enabled: bool) {
        self.mirror_enabled = enabled;
    }

    /// Whether reflected best fits may be folded into the mirror flag.
    #[must_use]
    pub const fn mirror_enabled(&self) -> bool {
        self.mirror_enabled
    }

    // --- accessors -------------------------------------------------------

    /// The current uniform scale.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.transform.scale
    }

    /// The current translation.
    #[must_use]
    pub const fn offset(&self) -> Vector3<f64> {
        self.transform.translation
    }

    /// The current rotation as Euler angles (see
    /// [`AlignmentTransform::euler_angles`] for the convention).
    #[must_use]
    pub fn euler_angles(&self) -> (f64, f64, f64) {
        self.transform.euler_angles()
    }

    /// Whether the transform mirrors the first axis.
    #[must_use]
    pub const fn is_mirror(&self) -> bool {
        self.transform.mirror
    }

    /// The composed axis-swap permutation.
    #[must_use]
    pub const fn axis_swap(&self) -> &Matrix3<f64> {
        &self.axis_swap
    }

    // --- observers -------------------------------------------------------

    /// Register the single change observer, replacing any prior one.
    pub fn set_change_callback(&mut self, callback: ChangeCallback) {
        self.callback = Some(callback);
    }

    /// Remove the registered change observer.
    pub fn clear_change_callback(&mut self) {
        self.callback = None;
    }

    /// Invoke the registered observer with the current transform.
    ///
    /// Fired automatically by every state-mutating call; exposed so owners
    /// can also fire it after operations that move the working field.
    pub fn notify(&mut self) {
        let transform = self.transform;
        if let Some(callback) = self.callback.as_mut() {
            callback(&transform);
        }
    }

    // --- state-mutating operations ---------------------------------------

    /// Reset to the identity transform and clear the axis swap.
    pub fn reset_alignment(&mut self) {
        self.transform = AlignmentTransform::identity();
        self.axis_swap = Matrix3::identity();
        self.notify();
    }

    /// Set the uniform scale directly.
    pub fn set_scale(&mut self, scale: f64) {
        self.transform.scale = scale;
        self.notify();
    }

    /// Set the translation directly.
    pub fn set_offset(&mut self, offset: Vector3<f64>) {
        self.transform.translation = offset;
        self.notify();
    }

    /// Set the rotation from Euler angles.
    pub fn set_euler_angles(&mut self, roll: f64, pitch: f64, yaw: f64) {
        self.transform.set_euler_angles(roll, pitch, yaw);
        self.notify();
    }

    /// Set the mirror flag directly.
    pub fn set_mirror(&mut self, mirror: bool) {
        self.transform.mirror = mirror;
        self.notify();
    }

    /// Translate so the transformed model centroid lands on the active data
    /// centroid. Rotation, scale, and mirror are unchanged.
    ///
    /// Idempotent: the second of two consecutive calls is a no-op up to
    /// floating-point precision.
    ///
    /// # Errors
    ///
    /// [`AlignError::EmptyInput`] when the model field has no nodes or the
    /// data set has no active points.
    pub fn auto_centre(
        &mut self,
        model: &CoordinateField,
        data: &DataPointSet,
    ) -> AlignResult<()> {
        let model_centroid = model.centroid().ok_or(AlignError::EmptyInput {
            what: "model coordinate field",
        })?;
        let data_centroid = data.centroid().ok_or(AlignError::EmptyInput {
            what: "active data point set",
        })?;

        let mapped = self
            .transform
            .transform_vector(&(self.axis_swap * model_centroid.coords));
        self.transform.translation = data_centroid.coords - mapped;

        debug!(
            offset_x = self.transform.translation.x,
            offset_y = self.transform.translation.y,
            offset_z = self.transform.translation.z,
            "auto-centred alignment"
        );
        self.notify();
        Ok(())
    }

    /// Set the uniform scale from the ratio of data size to model size,
    /// sizes measured as bounding-box diagonals.
    ///
    /// # Errors
    ///
    /// [`AlignError::EmptyInput`] on empty inputs,
    /// [`AlignError::DegenerateScale`] when the model size is below
    /// [`AlignmentEstimator::DEGENERATE_SIZE`].
    pub fn estimate_initial_scale(
        &mut self,
        model: &CoordinateField,
        data: &DataPointSet,
    ) -> AlignResult<()> {
        if model.is_empty() {
            return Err(AlignError::EmptyInput {
                what: "model coordinate field",
            });
        }
        if data.active_count() == 0 {
            return Err(AlignError::EmptyInput {
                what: "active data point set",
            });
        }

        let model_size = model.bounds().diagonal();
        if model_size < Self::DEGENERATE_SIZE {
            return Err(AlignError::DegenerateScale { size: model_size });
        }
        let data_size = data.bounds().diagonal();

        self.transform.scale = data_size / model_size;
        debug!(scale = self.transform.scale, "estimated initial scale");
        self.notify();
        Ok(())
    }

    /// Refine the rotation (and optionally scale) from correspondence pairs,
    /// composing the incremental solve onto the current transform.
    ///
    /// Pair sources are points in the *current* pose (already-transformed
    /// model positions, e.g. projection results); targets are the data
    /// positions they correspond to. The centroids of the pairs stay matched
    /// through the incremental translation.
    ///
    /// The residual over the fixed pairs never increases: when the solve
    /// would worsen it, the prior transform is kept, no observer fires, and
    /// [`RigidAlignOutcome::Unchanged`] is returned.
    ///
    /// # Errors
    ///
    /// * [`AlignError::EmptyInput`] for no pairs
    /// * [`AlignError::MirrorRequired`] for a reflected best fit with
    ///   mirroring disabled
    /// * [`AlignError::SvdFailed`] on decomposition failure
    pub fn rigid_align(
        &mut self,
        pairs: &[CorrespondencePair],
        with_scale: bool,
    ) -> AlignResult<RigidAlignOutcome> {
        let identity = AlignmentTransform::identity();
        let rms_before = rms_residual(pairs, &identity);

        let incremental = compute_similarity_transform(pairs, with_scale, self.mirror_enabled)?;
        let rms_after = rms_residual(pairs, &incremental);

        if rms_after > rms_before {
            debug!(rms_before, rms_after, "rigid align rejected; keeping prior transform");
            return Ok(RigidAlignOutcome::Unchanged { rms: rms_before });
        }

        self.transform = incremental.compose(&self.transform);
        debug!(rms_before, rms_after, "rigid align applied");
        self.notify();
        Ok(RigidAlignOutcome::Improved {
            rms_before,
            rms_after,
        })
    }

    /// Compose a two-axis swap onto the model-side permutation.
    ///
    /// Each call composes a fresh permutation: invoking the same swap twice
    /// compounds back to the identity. One-shot semantics are the caller's
    /// responsibility.
    pub fn swap_axes(&mut self, pair: AxisPair) {
        self.axis_swap = pair.matrix() * self.axis_swap;
        self.notify();
    }

    // --- application -----------------------------------------------------

    /// Map a model-space point through the axis swap and the transform.
    #[must_use]
    pub fn map_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.transform
            .transform_point(&Point3::from(self.axis_swap * point.coords))
    }

    /// Map a model-space vector through the axis swap and the linear part.
    #[must_use]
    pub fn map_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.transform.transform_vector(&(self.axis_swap * vector))
    }

    /// Write the transformed reference parameters into the working field.
    ///
    /// Positions map through the full transform, derivative vectors through
    /// the linear part.
    ///
    /// # Errors
    ///
    /// [`AlignError::InvalidParameter`] when the fields have different
    /// lengths.
    pub fn apply_to_field(
        &self,
        reference: &CoordinateField,
        working: &mut CoordinateField,
    ) -> AlignResult<()> {
        if reference.len() != working.len() {
            return Err(AlignError::InvalidParameter(format!(
                "field lengths differ: {} vs {}",
                reference.len(),
                working.len()
            )));
        }
        for (index, params) in reference.iter().enumerate() {
            // Index is in range; the length check above guarantees it.
            let Some(out) = working.node_mut(index) else {
                continue;
            };
            out.position = self.map_point(&params.position);
            for slot in DerivativeSlot::ALL {
                if slot == DerivativeSlot::Value {
                    continue;
                }
                if let Some(vector) = params.derivative(slot) {
                    out.set_derivative(slot, self.map_vector(&vector));
                }
            }
        }
        Ok(())
    }
}
