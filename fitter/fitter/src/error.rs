//! Error type for the fitting session.

use thiserror::Error;

/// Result type for session operations.
pub type FitterResult<T> = Result<T, FitterError>;

/// Errors surfaced by the fitting session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FitterError {
    /// A required input has not been loaded yet.
    #[error("{what} has not been loaded")]
    NotInitialized {
        /// Which input is missing.
        what: &'static str,
    },

    /// An alignment operation failed.
    #[error(transparent)]
    Align(#[from] fitter_align::AlignError),

    /// A projection pass failed.
    #[error(transparent)]
    Project(#[from] fitter_project::ProjectError),

    /// A fit solve failed.
    #[error(transparent)]
    Solve(#[from] fitter_solve::SolveError),

    /// Mesh construction or evaluation failed.
    #[error(transparent)]
    Mesh(#[from] fitter_types::MeshError),
}
