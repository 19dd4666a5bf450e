//! Error types for the fit solver.

use thiserror::Error;

/// Result type for solve operations.
pub type SolveResult<T> = Result<T, SolveError>;

/// Errors that abort a fit round.
///
/// A failed round leaves the working coordinate field exactly as the last
/// committed round left it; updates are only applied after a successful
/// solve.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SolveError {
    /// The regularized system is numerically singular, e.g. a mesh region
    /// with no data coverage and zero smoothing.
    #[error("regularized system is numerically singular: {reason}")]
    SingularSystem {
        /// What made the system unsolvable.
        reason: String,
    },

    /// Every projection this round was an outlier or diverged; there is
    /// nothing to fit.
    #[error("no accepted projections to fit against")]
    NoAcceptedProjections,

    /// The projection pass failed.
    #[error("projection failed: {0}")]
    Projection(#[from] fitter_project::ProjectError),

    /// Mesh lookup or evaluation failed.
    #[error("mesh error: {0}")]
    Mesh(#[from] fitter_types::MeshError),
}
