use refinery_analysis::{AnalysisError, RefineError};
use std::time::Duration;
use thiserror::Error;

/// Why a new iteration was not created.
///
/// In every case the history and the current pointer are left untouched.
#[derive(Error, Debug)]
pub enum IterationFailure {
    #[error("No current iteration")]
    NoCurrentIteration,

    #[error("Current iteration is marked satisfied")]
    AlreadySatisfied,

    #[error("A refinement is already in progress")]
    RefinementInFlight,

    #[error("Iteration {iteration} timed out after {}s", .after.as_secs())]
    TimedOut { iteration: usize, after: Duration },

    #[error(transparent)]
    Refinement(#[from] RefineError),

    #[error("Refinement returned an invalid analysis: {0}")]
    InvalidAnalysis(#[from] AnalysisError),

    #[error("History was reset while iteration {iteration} was being refined")]
    HistoryReset { iteration: usize },
}

impl IterationFailure {
    /// Precondition failures are rejected before the refiner is called
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            IterationFailure::NoCurrentIteration
                | IterationFailure::AlreadySatisfied
                | IterationFailure::RefinementInFlight
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            IterationFailure::NoCurrentIteration => "NO_CURRENT_ITERATION",
            IterationFailure::AlreadySatisfied => "ALREADY_SATISFIED",
            IterationFailure::RefinementInFlight => "REFINEMENT_IN_FLIGHT",
            IterationFailure::TimedOut { .. } => "TIMEOUT",
            IterationFailure::Refinement(e) => e.code(),
            IterationFailure::InvalidAnalysis(_) => "VALIDATION_ERROR",
            IterationFailure::HistoryReset { .. } => "HISTORY_RESET",
        }
    }
}
