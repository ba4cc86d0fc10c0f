//! Per-record outcomes and their aggregation over one populate run.

use std::sync::Arc;

use crate::error::Error;
use crate::types::{Record, RecordId, SyncProgress};

/// Result of resolving one record within a chunk
#[derive(Debug)]
pub enum RecordOutcome {
    /// The record was resolved; `record` is the payload handed to the store
    Success {
        /// 1-based position within the populate run
        position: usize,
        /// Record being resolved
        id: RecordId,
        /// Resolved image URL
        url: String,
        /// Record carrying `url`, ready for the batch write
        record: Record,
    },
    /// The record could not be resolved or persisted
    Failure {
        /// 1-based position within the populate run
        position: usize,
        /// Record being resolved
        id: RecordId,
        /// Final cause, shared when one store error fails a whole chunk
        error: Arc<Error>,
    },
}

impl RecordOutcome {
    /// Build a success outcome for `id`
    pub fn success(position: usize, id: RecordId, url: String) -> Self {
        let record = Record::resolved(id, url.clone());
        Self::Success {
            position,
            id,
            url,
            record,
        }
    }

    /// Build a failure outcome for `id`
    pub fn failure(position: usize, id: RecordId, error: Error) -> Self {
        Self::Failure {
            position,
            id,
            error: Arc::new(error),
        }
    }

    /// Record this outcome belongs to
    pub fn id(&self) -> RecordId {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } => *id,
        }
    }

    /// 1-based position of the record within the run
    pub fn position(&self) -> usize {
        match self {
            Self::Success { position, .. } | Self::Failure { position, .. } => *position,
        }
    }

    /// Whether the record was resolved
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A record that ended the run without a URL
#[derive(Clone, Debug)]
pub struct RecordFailure {
    /// 1-based position within the populate run
    pub position: usize,
    /// Record that failed
    pub id: RecordId,
    /// Why it failed
    pub error: Arc<Error>,
}

/// Aggregate of every chunk processed by one populate run
#[derive(Clone, Debug, Default)]
pub struct PopulateSummary {
    /// Records scheduled for the run
    pub total: usize,
    /// Ids resolved and persisted, in position order per chunk
    pub resolved: Vec<RecordId>,
    /// Ids that failed, with their causes
    pub failures: Vec<RecordFailure>,
    /// Chunks that reached the barrier
    pub chunks: usize,
    /// The run stopped early because the host cancelled it
    pub cancelled: bool,
}

impl PopulateSummary {
    /// Empty summary for a run over `total` records
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Records with a final outcome
    pub fn processed(&self) -> usize {
        self.resolved.len() + self.failures.len()
    }

    /// Records resolved and persisted
    pub fn succeeded(&self) -> usize {
        self.resolved.len()
    }

    /// Records that failed
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Every scheduled record has an outcome
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed() == self.total
    }

    /// At least one record was processed and none succeeded
    pub fn all_failed(&self) -> bool {
        self.processed() > 0 && self.succeeded() == 0
    }

    /// Cause of the earliest failure by position
    pub fn first_error(&self) -> Option<&Error> {
        self.failures
            .iter()
            .min_by_key(|f| f.position)
            .map(|f| f.error.as_ref())
    }

    /// Counters in the shape reported to progress sinks
    pub fn progress(&self) -> SyncProgress {
        SyncProgress {
            processed: self.processed(),
            total: self.total,
            succeeded: self.succeeded(),
            failed: self.failed(),
        }
    }

    /// Fold one chunk's outcomes into the running totals
    pub(crate) fn absorb(&mut self, outcomes: Vec<RecordOutcome>) {
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Success { id, .. } => self.resolved.push(id),
                RecordOutcome::Failure {
                    position,
                    id,
                    error,
                } => self.failures.push(RecordFailure {
                    position,
                    id,
                    error,
                }),
            }
        }
    }
}
