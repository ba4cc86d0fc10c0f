//! Background sync of the record set.
//!
//! A [`SyncTask`] runs one attempt at a time and reports a tri-state [`SyncOutcome`]
//! to its host:
//!
//! 1. trim the store to the target count (first records by insertion order survive)
//! 2. top up with empty records, or clear every URL when the store is already full
//! 3. resolve the selected records in chunks (see `batching`)
//! 4. map the attempt result onto the retry budget (see [`envelope`])
//!
//! ## Submodules
//!
//! - `context` — shared collaborators of one task
//! - [`outcome`] — per-record outcomes and the populate summary
//! - `record` — per-record outer retry loop
//! - `batching` — chunk loop, chunk barrier and batch persistence
//! - [`envelope`] — attempt state machine
//! - [`progress`] — progress sinks

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::resolver::UrlResolver;
use crate::store::RecordStore;
use crate::types::{Record, RecordId, SyncOutcome};

mod batching;
mod context;
pub mod envelope;
pub mod outcome;
pub mod progress;
mod record;

pub use envelope::{AttemptState, Terminal};
pub use outcome::{PopulateSummary, RecordFailure, RecordOutcome};
pub use progress::{EventProgress, NoopProgress, ProgressSink};

use context::SyncContext;

/// One sync of the record set, executed once per attempt by its host
#[derive(Clone)]
pub struct SyncTask {
    ctx: SyncContext,
}

impl SyncTask {
    /// Create a task over the given collaborators
    pub fn new(
        store: Arc<dyn RecordStore>,
        resolver: Arc<dyn UrlResolver>,
        progress: Arc<dyn ProgressSink>,
        config: Arc<Config>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            ctx: SyncContext {
                store,
                resolver,
                progress,
                config,
                cancel_token,
            },
        }
    }

    /// Token that cancels this task
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.ctx.cancel_token
    }

    /// Run attempt `attempt` (0-based) and classify it for the host
    ///
    /// Cancellation is reported as [`SyncOutcome::Done`]: it is not a failure and must
    /// not consume a retry.
    pub async fn execute(&self, attempt: u32) -> SyncOutcome {
        self.execute_reporting(attempt).await.0
    }

    /// Like [`execute`](Self::execute), also handing back the error of a failed attempt
    pub(crate) async fn execute_reporting(&self, attempt: u32) -> (SyncOutcome, Option<Error>) {
        let max_retries = self.ctx.config.sync.max_retries;
        tracing::info!(attempt, max_retries, "Starting sync attempt");

        match self.run_attempt(attempt).await {
            Ok(summary) if summary.cancelled => {
                tracing::info!(
                    attempt,
                    processed = summary.processed(),
                    "Sync cancelled"
                );
                self.ctx.progress.cancelled();
                (SyncOutcome::Done, None)
            }
            Ok(summary) => {
                tracing::info!(
                    attempt,
                    succeeded = summary.succeeded(),
                    failed = summary.failed(),
                    "Sync attempt finished"
                );
                self.ctx.progress.finished(&summary);
                (SyncOutcome::Done, None)
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(attempt, "Sync cancelled");
                self.ctx.progress.cancelled();
                (SyncOutcome::Done, None)
            }
            Err(e) => {
                let outcome = envelope::outcome_for_failure(attempt, max_retries);
                let will_retry = outcome == SyncOutcome::RetryRequested;
                tracing::error!(
                    attempt,
                    max_retries,
                    will_retry,
                    error = %e,
                    "Sync attempt failed"
                );
                self.ctx.progress.failed(attempt, &e, will_retry);
                (outcome, Some(e))
            }
        }
    }

    /// One attempt: normalize the store, then populate the selected records
    ///
    /// Fails when the store cannot be prepared, the populate run times out, or every
    /// processed record failed. Partial failure is a success.
    pub async fn run_attempt(&self, attempt: u32) -> Result<PopulateSummary> {
        let target = self.ctx.config.sync.target_count;
        let existing = self.trim_to_target(target).await?;
        self.ensure_not_cancelled()?;

        let ids: Vec<RecordId> = if existing.len() < target {
            let missing = target - existing.len();
            tracing::debug!(existing = existing.len(), missing, "Inserting empty records");
            self.ctx
                .store
                .insert_many(&vec![Record::empty(); missing])
                .await?
        } else {
            let cleared: Vec<Record> = existing
                .iter()
                .map(|record| Record {
                    id: record.id,
                    url: None,
                })
                .collect();
            tracing::debug!(records = cleared.len(), "Clearing record URLs");
            self.ctx.store.update_many(&cleared).await?;
            existing.into_iter().map(|record| record.id).collect()
        };
        self.ensure_not_cancelled()?;

        self.ctx.progress.started(attempt, ids.len());
        let summary = batching::populate(&self.ctx, ids).await?;

        if !summary.cancelled && summary.all_failed() {
            return Err(Error::AllRecordsFailed {
                failed: summary.failed(),
                first_error: summary
                    .first_error()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            });
        }
        Ok(summary)
    }

    /// Delete every record past the first `target`, returning the survivors
    async fn trim_to_target(&self, target: usize) -> Result<Vec<Record>> {
        let mut records = self.ctx.store.list_all().await?;
        if records.len() > target {
            let excess = records.split_off(target);
            tracing::info!(excess = excess.len(), target, "Trimming record store");
            self.ctx.store.delete_many(&excess).await?;
        }
        Ok(records)
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.ctx.cancel_token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
