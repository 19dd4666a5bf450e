//! Error types for alignment operations.

use thiserror::Error;

/// Result type for alignment operations.
pub type AlignResult<T> = Result<T, AlignError>;

/// Errors that can occur while estimating or editing the alignment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AlignError {
    /// An operation needing non-empty input received an empty mesh or
    /// point set.
    #[error("{what} is empty")]
    EmptyInput {
        /// Which input was empty.
        what: &'static str,
    },

    /// The measured model size is too small to derive a scale from.
    #[error("model size {size:.3e} is below the degeneracy threshold")]
    DegenerateScale {
        /// The measured size.
        size: f64,
    },

    /// The best-fit rotation is a reflection and mirroring is not enabled.
    ///
    /// Enable mirroring on the estimator to fold the reflection into the
    /// transform's mirror flag instead.
    #[error("best-fit rotation is a reflection; enable mirroring to accept it")]
    MirrorRequired,

    /// SVD computation failed during transform estimation.
    #[error("SVD computation failed during transform estimation")]
    SvdFailed,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
