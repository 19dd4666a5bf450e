//! Error types for projection passes.

use thiserror::Error;

/// Result type for projection operations.
pub type ProjectResult<T> = Result<T, ProjectError>;

/// Errors that abort a whole projection pass.
///
/// Per-point failures (a diverged local-coordinate search, a distance beyond
/// the outlier threshold) never abort a pass; they are recorded on the
/// individual [`crate::ProjectionResult`] instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProjectError {
    /// The resolved surface group contains no elements.
    #[error("surface group contains no elements")]
    NoSurfaceElements,

    /// The data point set has no active points.
    #[error("data point set has no active points")]
    EmptyPointSet,

    /// Mesh lookup or evaluation failed.
    #[error("mesh error: {0}")]
    Mesh(#[from] fitter_types::MeshError),
}
