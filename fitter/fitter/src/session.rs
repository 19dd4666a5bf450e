//! The fitting session: owned state and the operation surface the
//! surrounding application drives.

use crate::{FitPhase, FitState, FitterError, FitterResult};
use fitter_align::{
    AlignmentEstimator, AlignmentTransform, AxisPair, ChangeCallback, CorrespondencePair,
    RigidAlignOutcome,
};
use fitter_project::{project_points, ProjectionPass};
use fitter_solve::{fit_round, FitOutcome, FitParams, FitReport};
use fitter_types::{CoordinateField, DataPointSet, ScaffoldMesh, SurfaceGroup};
use nalgebra::Vector3;
use tracing::info;

/// Owns the mesh, the frozen reference and mutable working coordinate
/// fields, the data point set, the alignment estimator, and the fit state.
///
/// The session is the seam between the geometric engine and its external
/// collaborators: loaders hand it a mesh and a point cloud, the UI drives
/// alignment and fitting, and the rendering layer reads consistent
/// snapshots between calls. Operations requiring an input that has not been
/// loaded fail with [`FitterError::NotInitialized`].
///
/// # Working-field lifecycle
///
/// Alignment operations rebase the working field from the reference pose
/// under the current transform; fitting deforms the working field in place.
/// Loading a mesh or a point cloud resets the transform to identity and the
/// fit state to not-started.
///
/// # Example
///
/// ```
/// use fitter::FitterSession;
/// use fitter_types::{DataPointSet, Element, ElementBasis, ElementShape, Node};
/// use nalgebra::Point3;
///
/// let nodes = vec![
///     Node::at(1, Point3::new(0.0, 0.0, 0.0)),
///     Node::at(2, Point3::new(1.0, 0.0, 0.0)),
/// ];
/// let elements = vec![Element::new(1, ElementShape::Line, ElementBasis::Linear, vec![1, 2])];
/// let mesh = fitter_types::ScaffoldMesh::new(nodes, elements).unwrap();
///
/// let mut session = FitterSession::new();
/// session.set_mesh(mesh);
/// session.set_data_points(DataPointSet::new(vec![Point3::new(0.5, 1.0, 0.0)]));
///
/// session.auto_centre().unwrap();
/// assert!((session.offset().y - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Default)]
pub struct FitterSession {
    mesh: Option<ScaffoldMesh>,
    working: Option<CoordinateField>,
    data: Option<DataPointSet>,
    group: SurfaceGroup,
    estimator: AlignmentEstimator,
    state: FitState,
    last_pass: Option<ProjectionPass>,
}

impl FitterSession {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- inputs ----------------------------------------------------------

    /// Load a mesh: captures its reference field, resets the working field,
    /// the transform, and the fit state.
    pub fn set_mesh(&mut self, mesh: ScaffoldMesh) {
        self.working = Some(mesh.working_field());
        self.mesh = Some(mesh);
        self.last_pass = None;
        self.state.reset();
        self.estimator.reset_alignment();
    }

    /// Load a data point set: resets the transform, the working field, and
    /// the fit state.
    pub fn set_data_points(&mut self, data: DataPointSet) {
        self.data = Some(data);
        self.last_pass = None;
        self.state.reset();
        if let Some(mesh) = &self.mesh {
            self.working = Some(mesh.working_field());
        }
        self.estimator.reset_alignment();
    }

    /// Mutable access to the loaded data point set, e.g. to edit the active
    /// mask. Loading a *new* cloud goes through
    /// [`FitterSession::set_data_points`], which also resets the alignment.
    pub fn data_points_mut(&mut self) -> Option<&mut DataPointSet> {
        self.data.as_mut()
    }

    /// Narrow (or widen) the projection target element group.
    pub fn set_surface_group(&mut self, group: SurfaceGroup) {
        self.group = group;
        self.last_pass = None;
    }

    // --- read accessors --------------------------------------------------

    /// The loaded mesh, if any.
    #[must_use]
    pub const fn mesh(&self) -> Option<&ScaffoldMesh> {
        self.mesh.as_ref()
    }

    /// The loaded data point set, if any.
    #[must_use]
    pub const fn data_points(&self) -> Option<&DataPointSet> {
        self.data.as_ref()
    }

    /// The current surface group.
    #[must_use]
    pub const fn surface_group(&self) -> &SurfaceGroup {
        &self.group
    }

    /// The frozen reference field (undeformed pose), if a mesh is loaded.
    #[must_use]
    pub fn reference_field(&self) -> Option<&CoordinateField> {
        self.mesh.as_ref().map(ScaffoldMesh::reference_field)
    }

    /// The current working field (aligned/deformed pose), if a mesh is
    /// loaded. A consistent snapshot between calls; never observed
    /// mid-update.
    #[must_use]
    pub const fn working_field(&self) -> Option<&CoordinateField> {
        self.working.as_ref()
    }

    /// The last projection pass, for visualizing projection lines.
    #[must_use]
    pub const fn last_projection(&self) -> Option<&ProjectionPass> {
        self.last_pass.as_ref()
    }

    /// The fit state.
    #[must_use]
    pub const fn fit_state(&self) -> &FitState {
        &self.state
    }

    /// The current alignment transform.
    #[must_use]
    pub const fn alignment(&self) -> &AlignmentTransform {
        self.estimator.transform()
    }

    /// Current uniform scale, for numeric display.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.estimator.scale()
    }

    /// Current translation, for numeric display.
    #[must_use]
    pub const fn offset(&self) -> Vector3<f64> {
        self.estimator.offset()
    }

    /// Current rotation as Euler angles, for numeric display.
    #[must_use]
    pub fn euler_angles(&self) -> (f64, f64, f64) {
        self.estimator.euler_angles()
    }

    /// Whether the transform mirrors the first axis.
    #[must_use]
    pub const fn is_mirror(&self) -> bool {
        self.estimator.is_mirror()
    }

    /// Register the single change observer (replacing any prior one); it
    /// fires after every alignment mutation and each completed fit round.
    pub fn set_change_callback(&mut self, callback: ChangeCallback) {
        self.estimator.set_change_callback(callback);
    }

    /// Allow reflected best fits to fold into the mirror flag.
    pub fn set_mirror_enabled(&mut self, enabled: bool) {
        self.estimator.set_mirror_enabled(enabled);
    }

    // --- alignment operations --------------------------------------------

    /// Reset the transform to identity and clear fit progress. The working
    /// field returns to the reference pose.
    ///
    /// # Errors
    ///
    /// Never fails when no mesh is loaded; with a mesh loaded, field
    /// application errors propagate.
    pub fn reset_alignment(&mut self) -> FitterResult<()> {
        self.estimator.reset_alignment();
        self.state.reset();
        self.last_pass = None;
        self.rebase_working()
    }

    /// Match the transformed model centroid to the active data centroid.
    ///
    /// # Errors
    ///
    /// [`FitterError::NotInitialized`] when mesh or data is missing;
    /// alignment errors propagate.
    pub fn auto_centre(&mut self) -> FitterResult<()> {
        let mesh = self.mesh.as_ref().ok_or(FitterError::NotInitialized {
            what: "scaffold mesh",
        })?;
        let data = self.data.as_ref().ok_or(FitterError::NotInitialized {
            what: "data point set",
        })?;
        self.estimator.auto_centre(mesh.reference_field(), data)?;
        self.rebase_working()
    }

    /// Seed the scale from the data-to-model size ratio.
    ///
    /// # Errors
    ///
    /// [`FitterError::NotInitialized`] when mesh or data is missing;
    /// [`fitter_align::AlignError::DegenerateScale`] propagates.
    pub fn estimate_initial_scale(&mut self) -> FitterResult<()> {
        let mesh = self.mesh.as_ref().ok_or(FitterError::NotInitialized {
            what: "scaffold mesh",
        })?;
        let data = self.data.as_ref().ok_or(FitterError::NotInitialized {
            what: "data point set",
        })?;
        self.estimator.estimate_initial_scale(mesh.reference_field(), data)?;
        self.rebase_working()
    }

    /// One-shot rigid registration against the current projection results.
    ///
    /// Runs a projection pass if none is cached, solves the incremental
    /// similarity transform over the accepted (projection, data) pairs, and
    /// rebases the working field. The residual over those pairs never
    /// increases; a worsening solve keeps the prior transform.
    ///
    /// # Errors
    ///
    /// [`FitterError::NotInitialized`] when inputs are missing; projection
    /// and alignment errors (including
    /// [`fitter_align::AlignError::MirrorRequired`]) propagate.
    pub fn rigid_align(&mut self, with_scale: bool) -> FitterResult<RigidAlignOutcome> {
        if self.last_pass.is_none() {
            self.project()?;
        }
        // project() guarantees a pass.
        let Some(pass) = self.last_pass.as_ref() else {
            return Err(FitterError::NotInitialized {
                what: "projection results",
            });
        };
        let data = self.data.as_ref().ok_or(FitterError::NotInitialized {
            what: "data point set",
        })?;

        let pairs: Vec<CorrespondencePair> = pass
            .accepted_results()
            .filter_map(|result| {
                data.point(result.point_index)
                    .map(|target| CorrespondencePair::new(result.position, target))
            })
            .collect();

        let outcome = self.estimator.rigid_align(&pairs, with_scale)?;
        if matches!(outcome, RigidAlignOutcome::Improved { .. }) {
            self.rebase_working()?;
            self.last_pass = None;
        }
        Ok(outcome)
    }

    /// Rigid registration from explicit landmark pairs (sources in the
    /// current pose, targets in data space).
    ///
    /// # Errors
    ///
    /// Same conditions as [`FitterSession::rigid_align`].
    pub fn rigid_align_with_pairs(
        &mut self,
        pairs: &[CorrespondencePair],
        with_scale: bool,
    ) -> FitterResult<RigidAlignOutcome> {
        let outcome = self.estimator.rigid_align(pairs, with_scale)?;
        if matches!(outcome, RigidAlignOutcome::Improved { .. }) {
            self.rebase_working()?;
            self.last_pass = None;
        }
        Ok(outcome)
    }

    /// Swap two model axes (compounds on repeat) and rebase the working
    /// field.
    ///
    /// # Errors
    ///
    /// Field application errors propagate.
    pub fn swap_axes(&mut self, pair: AxisPair) -> FitterResult<()> {
        self.estimator.swap_axes(pair);
        self.rebase_working()
    }

    /// Set the scale directly (manual edit) and rebase.
    ///
    /// # Errors
    ///
    /// Field application errors propagate.
    pub fn set_scale(&mut self, scale: f64) -> FitterResult<()> {
        self.estimator.set_scale(scale);
        self.rebase_working()
    }

    /// Set the translation directly (manual edit) and rebase.
    ///
    /// # Errors
    ///
    /// Field application errors propagate.
    pub fn set_offset(&mut self, offset: Vector3<f64>) -> FitterResult<()> {
        self.estimator.set_offset(offset);
        self.rebase_working()
    }

    /// Set the rotation from Euler angles (manual edit) and rebase.
    ///
    /// # Errors
    ///
    /// Field application errors propagate.
    pub fn set_euler_angles(&mut self, roll: f64, pitch: f64, yaw: f64) -> FitterResult<()> {
        self.estimator.set_euler_angles(roll, pitch, yaw);
        self.rebase_working()
    }

    /// Set the mirror flag directly (manual edit) and rebase.
    ///
    /// # Errors
    ///
    /// Field application errors propagate.
    pub fn set_mirror(&mut self, mirror: bool) -> FitterResult<()> {
        self.estimator.set_mirror(mirror);
        self.rebase_working()
    }

    // --- projection and fitting ------------------------------------------

    /// Run a projection pass against the current working field and cache it.
    ///
    /// # Errors
    ///
    /// [`FitterError::NotInitialized`] when inputs are missing; projection
    /// errors propagate.
    pub fn project(&mut self) -> FitterResult<&ProjectionPass> {
        let mesh = self.mesh.as_ref().ok_or(FitterError::NotInitialized {
            what: "scaffold mesh",
        })?;
        let working = self.working.as_ref().ok_or(FitterError::NotInitialized {
            what: "working coordinate field",
        })?;
        let data = self.data.as_ref().ok_or(FitterError::NotInitialized {
            what: "data point set",
        })?;

        let pass = project_points(
            mesh,
            working,
            data,
            &self.group,
            &fitter_project::ProjectorParams::default(),
        )?;
        self.state.last_rms = Some(pass.rms);
        self.last_pass = Some(pass);
        // The borrow ends above; the cached pass is always present here.
        self.last_pass.as_ref().ok_or(FitterError::NotInitialized {
            what: "projection results",
        })
    }

    /// Run the fit loop, walking the state machine and firing the change
    /// observer after each completed round.
    ///
    /// Restarts from `Projecting` against the current working field, so a
    /// second call refines incrementally.
    ///
    /// # Errors
    ///
    /// [`FitterError::NotInitialized`] when inputs are missing. Round
    /// errors mark the state `Failed` and propagate; the working field
    /// keeps the last committed round.
    pub fn fit(&mut self, params: &FitParams) -> FitterResult<FitReport> {
        let mesh = self.mesh.as_ref().ok_or(FitterError::NotInitialized {
            what: "scaffold mesh",
        })?;
        let data = self.data.as_ref().ok_or(FitterError::NotInitialized {
            what: "data point set",
        })?;
        let working = self.working.as_mut().ok_or(FitterError::NotInitialized {
            what: "working coordinate field",
        })?;

        self.state.phase = FitPhase::Projecting;
        self.state.iterations = 0;

        let mut initial_rms = None;
        let mut previous_rms: Option<f64> = None;
        let mut outcome = FitOutcome::MaxIterationsReached;
        let mut rounds = 0;

        for round in 1..=params.max_iterations {
            self.state.phase = FitPhase::Projecting;
            let report = match fit_round(mesh, working, data, &self.group, params) {
                Ok(report) => report,
                Err(error) => {
                    self.state.phase = FitPhase::Failed;
                    return Err(error.into());
                }
            };
            self.state.phase = FitPhase::Solving;

            let rms = report.pass.rms;
            initial_rms.get_or_insert(rms);
            rounds = round;
            self.state.iterations = round;
            self.state.last_rms = Some(rms);
            self.last_pass = Some(report.pass);
            self.estimator.notify();

            info!(round, rms, "fit round complete");

            let converged = rms < 1e-12
                || previous_rms.is_some_and(|previous| {
                    previous - rms < params.tolerance * previous.max(1e-12)
                });
            previous_rms = Some(rms);
            if converged {
                outcome = FitOutcome::Converged;
                break;
            }
        }

        self.state.phase = match outcome {
            FitOutcome::Converged => FitPhase::Converged,
            FitOutcome::MaxIterationsReached => FitPhase::MaxIterationsReached,
        };

        Ok(FitReport {
            outcome,
            rounds,
            initial_rms: initial_rms.unwrap_or(0.0),
            final_rms: previous_rms.unwrap_or(0.0),
            last_pass: self.last_pass.clone(),
        })
    }

    // --- internals -------------------------------------------------------

    /// Rewrite the working field as the transformed reference pose.
    fn rebase_working(&mut self) -> FitterResult<()> {
        let Some(mesh) = self.mesh.as_ref() else {
            return Ok(());
        };
        let Some(working) = self.working.as_mut() else {
            return Ok(());
        };
        self.estimator
            .apply_to_field(mesh.reference_field(), working)?;
        Ok(())
    }
}
