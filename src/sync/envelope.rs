//! Attempt bookkeeping between a sync task and the host that re-runs it.

use crate::types::SyncOutcome;

/// Where a sync currently stands in its retry budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptState {
    /// Attempt `n` (0-based) is due
    Attempting(u32),
    /// No further attempts will be made
    Terminal(Terminal),
}

/// How a sync ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    /// An attempt succeeded or the sync was cancelled
    Succeeded,
    /// The final permitted attempt failed
    Failed,
}

impl AttemptState {
    /// State before the first attempt
    pub fn start() -> Self {
        Self::Attempting(0)
    }

    /// Apply the outcome reported by the current attempt
    pub fn advance(self, outcome: SyncOutcome) -> Self {
        match (self, outcome) {
            (Self::Attempting(_), SyncOutcome::Done) => Self::Terminal(Terminal::Succeeded),
            (Self::Attempting(n), SyncOutcome::RetryRequested) => {
                Self::Attempting(n.saturating_add(1))
            }
            (Self::Attempting(_), SyncOutcome::PermanentlyFailed) => {
                Self::Terminal(Terminal::Failed)
            }
            (terminal @ Self::Terminal(_), _) => terminal,
        }
    }

    /// Whether no more attempts will be made
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Outcome of a failed attempt given the retry budget
pub(crate) fn outcome_for_failure(attempt: u32, max_retries: u32) -> SyncOutcome {
    if attempt < max_retries {
        SyncOutcome::RetryRequested
    } else {
        SyncOutcome::PermanentlyFailed
    }
}
