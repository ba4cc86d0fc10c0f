//! Chunked, bounded-concurrency population of record URLs.
//!
//! Ids are split into consecutive chunks. Each chunk spawns one task per record,
//! waits for all of them (bounded by the chunk timeout), persists the successes with
//! a single batch write and reports cumulative progress before the next chunk starts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::types::{Record, RecordId};

use super::context::SyncContext;
use super::outcome::{PopulateSummary, RecordOutcome};
use super::record::{ProcessRecordParams, RecordSettings, process_record};

/// Pair ids with their 1-based positions and split them into chunks of `batch_size`
///
/// A `batch_size` of 0 is treated as 1.
pub(crate) fn partition(ids: &[RecordId], batch_size: usize) -> Vec<Vec<(usize, RecordId)>> {
    let positioned: Vec<(usize, RecordId)> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| (index + 1, *id))
        .collect();

    positioned
        .chunks(batch_size.max(1))
        .map(<[(usize, RecordId)]>::to_vec)
        .collect()
}

/// Resolve and persist `ids`, bounded by the configured populate timeout
///
/// Per-record and per-chunk failures are folded into the summary; only the overall
/// timeout is returned as an error.
pub(super) async fn populate(ctx: &SyncContext, ids: Vec<RecordId>) -> Result<PopulateSummary> {
    let batch_timeout = ctx.config.batch.batch_timeout;

    match tokio::time::timeout(batch_timeout, populate_chunks(ctx, ids)).await {
        Ok(summary) => Ok(summary),
        Err(_) => {
            tracing::error!(
                timeout_secs = batch_timeout.as_secs(),
                "Populate run exceeded its time budget"
            );
            Err(Error::Timeout {
                operation: "populate",
                elapsed: batch_timeout,
            })
        }
    }
}

async fn populate_chunks(ctx: &SyncContext, ids: Vec<RecordId>) -> PopulateSummary {
    let chunks = partition(&ids, ctx.config.batch.batch_size);
    let chunk_count = chunks.len();
    let mut summary = PopulateSummary::new(ids.len());

    tracing::info!(
        records = ids.len(),
        chunks = chunk_count,
        batch_size = ctx.config.batch.batch_size,
        "Populating records"
    );

    for (index, chunk) in chunks.into_iter().enumerate() {
        if ctx.cancel_token.is_cancelled() {
            tracing::info!(chunk = index, chunks = chunk_count, "Populate cancelled");
            break;
        }

        let outcomes = run_chunk(ctx, &chunk).await;
        let outcomes = persist_chunk(ctx, index, outcomes).await;

        summary.absorb(outcomes);
        summary.chunks += 1;

        let progress = summary.progress();
        tracing::debug!(
            chunk = index,
            processed = progress.processed,
            total = progress.total,
            succeeded = progress.succeeded,
            failed = progress.failed,
            "Chunk complete"
        );
        ctx.progress.report(progress);
    }

    summary.cancelled = ctx.cancel_token.is_cancelled();
    summary
}

/// Run one task per record and wait for all of them
///
/// Outcomes are returned in position order. Records still pending when the chunk
/// timeout expires, or whose task died, become failures.
async fn run_chunk(ctx: &SyncContext, chunk: &[(usize, RecordId)]) -> Vec<RecordOutcome> {
    let settings = RecordSettings::from_config(&ctx.config.batch);
    let chunk_timeout = ctx.config.batch.chunk_timeout();

    let mut join_set = JoinSet::new();
    for &(position, id) in chunk {
        join_set.spawn(process_record(ProcessRecordParams {
            resolver: Arc::clone(&ctx.resolver),
            settings: settings.clone(),
            cancel_token: ctx.cancel_token.clone(),
            position,
            id,
        }));
    }

    let mut pending: HashMap<RecordId, usize> = chunk.iter().map(|&(p, id)| (id, p)).collect();
    let mut outcomes = Vec::with_capacity(chunk.len());

    let collect = async {
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    pending.remove(&outcome.id());
                    outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Record task did not complete");
                }
            }
        }
    };
    let timed_out = tokio::time::timeout(chunk_timeout, collect).await.is_err();

    if timed_out {
        join_set.abort_all();
        tracing::warn!(
            pending = pending.len(),
            timeout_secs = chunk_timeout.as_secs(),
            "Chunk timed out, failing pending records"
        );
    }

    for (id, position) in pending {
        let error = if timed_out {
            Error::Timeout {
                operation: "chunk",
                elapsed: chunk_timeout,
            }
        } else {
            Error::Other(format!("task for record {} did not complete", id))
        };
        outcomes.push(RecordOutcome::failure(position, id, error));
    }

    outcomes.sort_by_key(RecordOutcome::position);
    outcomes
}

/// Write every success of a chunk with one store call
///
/// If the write fails, the chunk's successes become failures carrying the store error.
async fn persist_chunk(
    ctx: &SyncContext,
    chunk_index: usize,
    outcomes: Vec<RecordOutcome>,
) -> Vec<RecordOutcome> {
    let records: Vec<Record> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            RecordOutcome::Success { record, .. } => Some(record.clone()),
            RecordOutcome::Failure { .. } => None,
        })
        .collect();

    if records.is_empty() {
        return outcomes;
    }

    match ctx.store.update_many(&records).await {
        Ok(()) => outcomes,
        Err(e) => {
            tracing::error!(
                chunk = chunk_index,
                records = records.len(),
                error = %e,
                "Failed to persist chunk"
            );
            let error = Arc::new(e);
            outcomes
                .into_iter()
                .map(|outcome| match outcome {
                    RecordOutcome::Success { position, id, .. } => RecordOutcome::Failure {
                        position,
                        id,
                        error: Arc::clone(&error),
                    },
                    failure => failure,
                })
                .collect()
        }
    }
}
