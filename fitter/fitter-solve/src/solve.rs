//! The fit loop: alternate projection and linear solves to convergence.

use crate::system::{assemble, solve_cg};
use crate::{SolveError, SolveResult};
use fitter_project::{project_points, ProjectionPass, ProjectorParams};
use fitter_types::{CoordinateField, DataPointSet, ScaffoldMesh, SurfaceGroup};
use nalgebra::Vector3;
use tracing::{debug, info};

/// Parameters for the fit loop.
///
/// # Example
///
/// ```
/// use fitter_solve::FitParams;
///
/// let params = FitParams::new()
///     .with_smoothing_weight(0.5)
///     .with_max_iterations(20)
///     .with_tolerance(1e-8);
/// assert!((params.smoothing_weight - 0.5).abs() < 1e-15);
/// ```
#[derive(Debug, Clone)]
pub struct FitParams {
    /// Weight of the bending-energy smoothing penalty (default 0.1).
    ///
    /// Zero degenerates to pure data fitting, which can buckle mesh regions
    /// without data coverage; very large values degenerate toward rigid
    /// motion.
    pub smoothing_weight: f64,
    /// Maximum number of project/solve rounds (default 10).
    pub max_iterations: u32,
    /// Relative RMS-improvement threshold for convergence (default 1e-6).
    pub tolerance: f64,
    /// Parameters for the projection passes.
    pub projector: ProjectorParams,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            smoothing_weight: 0.1,
            max_iterations: 10,
            tolerance: 1e-6,
            projector: ProjectorParams::default(),
        }
    }
}

impl FitParams {
    /// Create parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the smoothing weight.
    #[must_use]
    pub const fn with_smoothing_weight(mut self, weight: f64) -> Self {
        self.smoothing_weight = weight;
        self
    }

    /// Set the round cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the relative convergence tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the projection parameters.
    #[must_use]
    pub fn with_projector(mut self, projector: ProjectorParams) -> Self {
        self.projector = projector;
        self
    }
}

/// How a fit loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    /// The relative RMS improvement dropped below the tolerance.
    Converged,
    /// The round cap was reached first.
    MaxIterationsReached,
}

/// Statistics of a single project/solve round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    /// The projection pass the round solved against.
    pub pass: ProjectionPass,
    /// Number of unknowns in the linear system.
    pub dof_count: usize,
    /// Largest per-DOF displacement applied, as a vector norm.
    pub max_update: f64,
}

/// Result of a full fit loop.
#[derive(Debug, Clone)]
pub struct FitReport {
    /// Why the loop stopped.
    pub outcome: FitOutcome,
    /// Rounds completed.
    pub rounds: u32,
    /// RMS of the first projection pass.
    pub initial_rms: f64,
    /// RMS of the last projection pass.
    pub final_rms: f64,
    /// The last projection pass, for visualization.
    pub last_pass: Option<ProjectionPass>,
}

/// Run one projection pass and one linear solve, committing the update.
///
/// The working field is mutated only after the solve succeeds: any error
/// leaves it untouched.
///
/// # Errors
///
/// * [`SolveError::Projection`] when the projection pass fails
/// * [`SolveError::NoAcceptedProjections`] when every point was an outlier
/// * [`SolveError::SingularSystem`] when the regularized system cannot be
///   solved
pub fn fit_round(
    mesh: &ScaffoldMesh,
    working: &mut CoordinateField,
    data: &DataPointSet,
    group: &SurfaceGroup,
    params: &FitParams,
) -> SolveResult<RoundReport> {
    let pass = project_points(mesh, working, data, group, &params.projector)?;
    if pass.accepted == 0 {
        return Err(SolveError::NoAcceptedProjections);
    }

    let system = assemble(mesh, &pass, params.smoothing_weight)?;
    let solution_x = solve_cg(&system.matrix, &system.rhs[0])?;
    let solution_y = solve_cg(&system.matrix, &system.rhs[1])?;
    let solution_z = solve_cg(&system.matrix, &system.rhs[2])?;

    // All three solves succeeded; commit the displacement.
    let mut max_update = 0.0_f64;
    for (column, &(node_index, slot)) in system.dofs.entries().iter().enumerate() {
        let update = Vector3::new(solution_x[column], solution_y[column], solution_z[column]);
        max_update = max_update.max(update.norm());
        if let Some(node) = working.node_mut(node_index) {
            let current = node.slot_vector(slot);
            node.set_derivative(slot, current + update);
        }
    }

    debug!(
        dofs = system.dofs.len(),
        accepted = pass.accepted,
        rms = pass.rms,
        max_update,
        "fit round committed"
    );

    Ok(RoundReport {
        pass,
        dof_count: system.dofs.len(),
        max_update,
    })
}

/// RMS below which the fit is treated as exact.
const EXACT_RMS: f64 = 1e-12;

/// Alternate projection and solve until the relative RMS improvement drops
/// below the tolerance or the round cap is reached.
///
/// Every round is a full re-projection: the deforming mesh changes which
/// elements are closest to which points. Re-invoking after a terminal
/// outcome restarts from the current (already-deformed) working field,
/// supporting incremental refinement.
///
/// # Errors
///
/// Same conditions as [`fit_round`]; the working field keeps the state of
/// the last successfully committed round.
pub fn fit(
    mesh: &ScaffoldMesh,
    working: &mut CoordinateField,
    data: &DataPointSet,
    group: &SurfaceGroup,
    params: &FitParams,
) -> SolveResult<FitReport> {
    let mut initial_rms = None;
    let mut previous_rms: Option<f64> = None;
    let mut last_pass: Option<ProjectionPass> = None;
    let mut rounds = 0;

    for round in 1..=params.max_iterations {
        let report = fit_round(mesh, working, data, group, params)?;
        let rms = report.pass.rms;
        initial_rms.get_or_insert(rms);
        rounds = round;

        info!(round, rms, accepted = report.pass.accepted, "fit round");

        let converged = rms < EXACT_RMS
            || previous_rms.is_some_and(|previous| {
                let improvement = previous - rms;
                improvement < params.tolerance * previous.max(EXACT_RMS)
            });
        previous_rms = Some(rms);
        last_pass = Some(report.pass);

        if converged {
            return Ok(FitReport {
                outcome: FitOutcome::Converged,
                rounds,
                initial_rms: initial_rms.unwrap_or(rms),
                final_rms: rms,
                last_pass,
            });
        }
    }

    Ok(FitReport {
        outcome: FitOutcome::MaxIterationsReached,
        rounds,
        initial_rms: initial_rms.unwrap_or(0.0),
        final_rms: previous_rms.unwrap_or(0.0),
        last_pass,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fitter_types::{Element, ElementBasis, ElementShape, Node};
    use nalgebra::Point3;

    fn segment_mesh() -> ScaffoldMesh {
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
    fn exact_interpolation_with_zero_smoothing() {
        // Two data points over the two nodes: with zero smoothing the system
        // is exactly determined and the residual drops to zero.
        let mesh = segment_mesh();
        let mut working = mesh.working_field();
        let data = DataPointSet::new(vec![
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ]);
        let params = FitParams::new().with_smoothing_weight(0.0).with_max_iterations(10);

        let report = fit(&mesh, &mut working, &data, &SurfaceGroup::All, &params).unwrap();

        assert_eq!(report.outcome, FitOutcome::Converged);
        assert!(report.final_rms < 1e-9, "final rms {}", report.final_rms);
        assert_relative_eq!(working.node(0).unwrap().position.y, 1.0, epsilon = 1e-9);
        assert_relative_eq!(working.node(1).unwrap().position.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn smoothing_resists_bending() {
        // Opposite pulls at the two ends maximize the bending penalty;
        // uniform translation stays free under the Laplacian, so only a
        // non-uniform target shows the smoothing's effect.
        let mesh = segment_mesh();
        let data = DataPointSet::new(vec![
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
        ]);

        let mut lightly_smoothed = mesh.working_field();
        let light = FitParams::new().with_smoothing_weight(1e-6).with_max_iterations(1);
        fit_round(&mesh, &mut lightly_smoothed, &data, &SurfaceGroup::All, &light).unwrap();

        let mut heavily_smoothed = mesh.working_field();
        let heavy = FitParams::new().with_smoothing_weight(1e3).with_max_iterations(1);
        fit_round(&mesh, &mut heavily_smoothed, &data, &SurfaceGroup::All, &heavy).unwrap();

        let light_y = lightly_smoothed.node(0).unwrap().position.y;
        let heavy_y = heavily_smoothed.node(0).unwrap().position.y;
        assert!(light_y > 0.9, "light smoothing should reach the data: {light_y}");
        assert!(heavy_y < 0.1, "heavy smoothing should stay near rigid: {heavy_y}");
    }

    #[test]
    fn failed_round_leaves_field_untouched() {
        let mesh = segment_mesh();
        let mut working = mesh.working_field();
        let before = working.clone();

        // An outlier threshold excluding everything leaves nothing to fit.
        let params = FitParams::new()
            .with_projector(ProjectorParams::new().with_outlier_distance(1e-6));
        let data = DataPointSet::new(vec![Point3::new(0.5, 10.0, 0.0)]);

        let result = fit_round(&mesh, &mut working, &data, &SurfaceGroup::All, &params);
        assert!(matches!(result, Err(SolveError::NoAcceptedProjections)));
        assert_eq!(working, before);
    }

    #[test]
    fn max_iterations_reached_reports_outcome() {
        let mesh = segment_mesh();
        let mut working = mesh.working_field();
        // One asymmetric point keeps the loop from converging in one round.
        let data = DataPointSet::new(vec![Point3::new(0.3, 1.0, 0.0)]);
        let params = FitParams::new()
            .with_smoothing_weight(0.5)
            .with_max_iterations(1)
            .with_tolerance(1e-30);

        let report = fit(&mesh, &mut working, &data, &SurfaceGroup::All, &params).unwrap();
        assert_eq!(report.outcome, FitOutcome::MaxIterationsReached);
        assert_eq!(report.rounds, 1);
    }

    #[test]
    fn fit_reduces_rms_monotonically_here() {
        let mesh = segment_mesh();
        let mut working = mesh.working_field();
        let data = DataPointSet::new(vec![
            Point3::new(0.1, 0.5, 0.0),
            Point3::new(0.9, -0.5, 0.0),
        ]);
        let params = FitParams::new().with_smoothing_weight(0.01).with_max_iterations(5);

        let report = fit(&mesh, &mut working, &data, &SurfaceGroup::All, &params).unwrap();
        assert!(report.final_rms <= report.initial_rms);
    }

    #[test]
    fn refit_refines_incrementally() {
        // With opposite pulls and moderate smoothing, one round only moves
        // partway; a second fit starts from the deformed field and gets
        // closer.
        let mesh = segment_mesh();
        let mut working = mesh.working_field();
        let data = DataPointSet::new(vec![
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
        ]);
        let params = FitParams::new().with_smoothing_weight(1.0).with_max_iterations(1);

        fit(&mesh, &mut working, &data, &SurfaceGroup::All, &params).unwrap();
        let after_first = working.node(0).unwrap().position.y;

        fit(&mesh, &mut working, &data, &SurfaceGroup::All, &params).unwrap();
        let after_second = working.node(0).unwrap().position.y;

        assert!(after_first > 0.0);
        assert!(after_second > after_first);
        assert!(after_second <= 1.0 + 1e-9);
    }
}
