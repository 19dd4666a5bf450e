//! Parameters for projection passes.

/// Parameters controlling a projection pass.
///
/// # Example
///
/// ```
/// use fitter_project::ProjectorParams;
///
/// let params = ProjectorParams::new()
///     .with_outlier_distance(5.0)
///     .with_max_newton_iterations(64);
/// assert_eq!(params.outlier_distance, Some(5.0));
/// ```
#[derive(Debug, Clone)]
pub struct ProjectorParams {
    /// Distance beyond which a point is flagged as an outlier for the pass.
    /// `None` disables outlier filtering (default).
    pub outlier_distance: Option<f64>,
    /// Iteration cap for the per-point local-coordinate search (default 32).
    pub max_newton_iterations: u32,
    /// Convergence threshold on the local-coordinate step norm
    /// (default 1e-10).
    pub newton_tolerance: f64,
}

impl Default for ProjectorParams {
    fn default() -> Self {
        Self {
            outlier_distance: None,
            max_newton_iterations: 32,
            newton_tolerance: 1e-10,
        }
    }
}

impl ProjectorParams {
    /// Create parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outlier distance threshold.
    #[must_use]
    pub const fn with_outlier_distance(mut self, distance: f64) -> Self {
        self.outlier_distance = Some(distance);
        self
    }

    /// Disable outlier filtering.
    #[must_use]
    pub const fn without_outlier_distance(mut self) -> Self {
        self.outlier_distance = None;
        self
    }

    /// Set the local-coordinate search iteration cap.
    #[must_use]
    pub const fn with_max_newton_iterations(mut self, iterations: u32) -> Self {
        self.max_newton_iterations = iterations;
        self
    }

    /// Set the local-coordinate convergence threshold.
    #[must_use]
    pub const fn with_newton_tolerance(mut self, tolerance: f64) -> Self {
        self.newton_tolerance = tolerance;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_roundtrip() {
        let params = ProjectorParams::new()
            .with_outlier_distance(2.0)
            .with_max_newton_iterations(10)
            .with_newton_tolerance(1e-8);
        assert_eq!(params.outlier_distance, Some(2.0));
        assert_eq!(params.max_newton_iterations, 10);
        assert!((params.newton_tolerance - 1e-8).abs() < f64::EPSILON);

        let params = params.without_outlier_distance();
        assert_eq!(params.outlier_distance, None);
    }
}
