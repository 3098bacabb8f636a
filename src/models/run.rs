//! Summary of one scheduler run.

use super::Outcome;

/// Why a removal run ended before its queue was exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// An entity was abandoned by the per-entity deadline.
    DeadlineExceeded { id: String },
    /// The site answered with a rate-limit status.
    RateLimited { id: String },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeadlineExceeded { id } => write!(f, "processing of {} exceeded its deadline", id),
            Self::RateLimited { id } => write!(f, "rate limited while processing {}", id),
        }
    }
}

/// Tally of a removal run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub batches: usize,
    pub cooldowns: usize,
    /// Set when the run terminated early.
    pub stopped: Option<StopReason>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}
