//! Fit progress state.

/// Phase of the fit state machine.
///
/// `Projecting` and `Solving` alternate during a fit call; `Converged`,
/// `MaxIterationsReached`, and `Failed` are terminal. Invoking
/// [`crate::FitterSession::fit`] after a terminal phase restarts from
/// `Projecting` against the current working field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitPhase {
    /// No fit has been run since the last reset.
    #[default]
    NotStarted,
    /// A projection pass is in progress.
    Projecting,
    /// A linear solve is in progress.
    Solving,
    /// The relative RMS improvement dropped below the tolerance.
    Converged,
    /// The round cap was reached before convergence.
    MaxIterationsReached,
    /// The last fit call aborted with an error.
    Failed,
}

impl FitPhase {
    /// Whether this phase ends a fit call.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Converged | Self::MaxIterationsReached | Self::Failed
        )
    }
}

/// Mutable fit progress shared with the UI: phase, iteration counter, and
/// the last measured residual norm.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitState {
    /// Current phase.
    pub phase: FitPhase,
    /// Rounds completed in the current (or last) fit call.
    pub iterations: u32,
    /// RMS of the last projection pass, if any.
    pub last_rms: Option<f64>,
}

impl FitState {
    /// Reset to the initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether the last fit call converged.
    #[must_use]
    pub const fn converged(&self) -> bool {
        matches!(self.phase, FitPhase::Converged)
    }
}
