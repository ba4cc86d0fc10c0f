//! Tests for the sync module.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;

use crate::error::{DatabaseError, ResolveError};
use crate::types::Event;

use super::batching::partition;
use super::record::{ProcessRecordParams, RecordSettings, process_record};
use super::*;

// -----------------------------------------------------------------------
// Fakes
// -----------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    /// Fail the first `n` calls, then succeed
    FailTimes(u64),
    /// Succeed the first `n` calls, then never answer
    SucceedThenHang(u64),
    /// Panic on call `n`, succeed on every other call
    PanicOnCall(u64),
}

struct FakeResolver {
    calls: AtomicU64,
    behavior: Behavior,
    cancel_on_call: Option<(u64, CancellationToken)>,
}

impl FakeResolver {
    fn new(behavior: Behavior) -> Self {
        Self {
            calls: AtomicU64::new(0),
            behavior,
            cancel_on_call: None,
        }
    }

    fn cancelling_on(call: u64, token: CancellationToken) -> Self {
        Self {
            cancel_on_call: Some((call, token)),
            ..Self::new(Behavior::Succeed)
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl UrlResolver for FakeResolver {
    async fn resolve(&self) -> std::result::Result<String, ResolveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((n, token)) = &self.cancel_on_call
            && call == *n
        {
            token.cancel();
        }

        match self.behavior {
            Behavior::Succeed => Ok(format!("https://img/{call}.jpg")),
            Behavior::Fail => Err(ResolveError::UnexpectedStatus(503)),
            Behavior::FailTimes(n) if call < n => Err(ResolveError::MissingLocation),
            Behavior::FailTimes(_) => Ok(format!("https://img/{call}.jpg")),
            Behavior::SucceedThenHang(n) if call < n => Ok(format!("https://img/{call}.jpg")),
            Behavior::SucceedThenHang(_) => std::future::pending().await,
            Behavior::PanicOnCall(n) if call == n => panic!("resolver blew up on call {call}"),
            Behavior::PanicOnCall(_) => Ok(format!("https://img/{call}.jpg")),
        }
    }
}

#[derive(Default)]
struct FakeStore {
    records: Mutex<Vec<Record>>,
    next_id: AtomicI64,
    inserted: AtomicUsize,
    deleted: AtomicUsize,
    delete_batches: AtomicUsize,
    updates: Mutex<Vec<Vec<Record>>>,
    fail_update_call: Option<usize>,
    fail_list: bool,
}

impl FakeStore {
    fn with_records(count: usize, url: Option<&str>) -> Self {
        let records = (1..=count)
            .map(|i| Record {
                id: RecordId(i as i64),
                url: url.map(str::to_string),
            })
            .collect();
        Self {
            records: Mutex::new(records),
            next_id: AtomicI64::new(count as i64),
            ..Self::default()
        }
    }

    fn snapshot(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    fn update_batches(&self) -> Vec<Vec<Record>> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecordStore for FakeStore {
    async fn list_all(&self) -> Result<Vec<Record>> {
        if self.fail_list {
            return Err(Error::Other("store offline".into()));
        }
        Ok(self.snapshot())
    }

    fn stream_all(&self) -> BoxStream<'static, Vec<Record>> {
        futures::stream::iter(vec![self.snapshot()]).boxed()
    }

    async fn insert_one(&self, record: &Record) -> Result<RecordId> {
        let ids = self.insert_many(std::slice::from_ref(record)).await?;
        Ok(ids[0])
    }

    async fn insert_many(&self, records: &[Record]) -> Result<Vec<RecordId>> {
        let mut stored = self.records.lock().unwrap();
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = RecordId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            stored.push(Record {
                id,
                url: record.url.clone(),
            });
            ids.push(id);
        }
        self.inserted.fetch_add(records.len(), Ordering::SeqCst);
        Ok(ids)
    }

    async fn update_one(&self, record: &Record) -> Result<()> {
        self.update_many(std::slice::from_ref(record)).await
    }

    async fn update_many(&self, records: &[Record]) -> Result<()> {
        let call = {
            let mut updates = self.updates.lock().unwrap();
            updates.push(records.to_vec());
            updates.len() - 1
        };
        if self.fail_update_call == Some(call) {
            return Err(Error::Other("disk full".into()));
        }

        let mut stored = self.records.lock().unwrap();
        for record in records {
            let slot = stored
                .iter_mut()
                .find(|r| r.id == record.id)
                .ok_or_else(|| DatabaseError::NotFound(format!("record {}", record.id)))?;
            slot.url = record.url.clone();
        }
        Ok(())
    }

    async fn delete_one(&self, record: &Record) -> Result<()> {
        self.records.lock().unwrap().retain(|r| r.id != record.id);
        self.deleted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_many(&self, records: &[Record]) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .retain(|r| records.iter().all(|d| d.id != r.id));
        self.deleted.fetch_add(records.len(), Ordering::SeqCst);
        self.delete_batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        let mut stored = self.records.lock().unwrap();
        self.deleted.fetch_add(stored.len(), Ordering::SeqCst);
        stored.clear();
        Ok(())
    }
}

fn test_config(target: usize, batch_size: usize) -> Config {
    let mut config = Config::default();
    config.sync.target_count = target;
    config.batch.batch_size = batch_size;
    config.batch.retry_delay = Duration::from_millis(1);
    config
}

fn make_task(
    store: &Arc<FakeStore>,
    resolver: &Arc<FakeResolver>,
    config: Config,
    cancel_token: CancellationToken,
) -> SyncTask {
    SyncTask::new(
        store.clone(),
        resolver.clone(),
        Arc::new(NoopProgress),
        Arc::new(config),
        cancel_token,
    )
}

// -----------------------------------------------------------------------
// partition
// -----------------------------------------------------------------------

#[test]
fn partition_makes_ceil_chunks_covering_every_id_once() {
    for (n, b) in [(0usize, 8usize), (1, 8), (7, 8), (8, 8), (9, 8), (140, 8), (140, 1)] {
        let ids: Vec<RecordId> = (1..=n as i64).map(RecordId).collect();
        let chunks = partition(&ids, b);

        assert_eq!(chunks.len(), n.div_ceil(b), "n={n} b={b}");
        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= b));

        let flattened: Vec<(usize, RecordId)> = chunks.into_iter().flatten().collect();
        let positions: Vec<usize> = flattened.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, (1..=n).collect::<Vec<_>>());
        let covered: Vec<RecordId> = flattened.iter().map(|(_, id)| *id).collect();
        assert_eq!(covered, ids);
    }
}

#[test]
fn partition_treats_zero_batch_size_as_one() {
    let ids = vec![RecordId(10), RecordId(11), RecordId(12)];
    let chunks = partition(&ids, 0);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1], vec![(2, RecordId(11))]);
}

// -----------------------------------------------------------------------
// process_record
// -----------------------------------------------------------------------

fn record_params(
    resolver: &Arc<FakeResolver>,
    max_retries: u32,
    retry_delay: Duration,
    network_timeout: Duration,
    cancel_token: CancellationToken,
) -> ProcessRecordParams {
    let batch = crate::config::BatchConfig {
        record_max_retries: max_retries,
        retry_delay,
        network_timeout,
        ..Default::default()
    };
    ProcessRecordParams {
        resolver: resolver.clone(),
        settings: RecordSettings::from_config(&batch),
        cancel_token,
        position: 1,
        id: RecordId(1),
    }
}

#[tokio::test]
async fn process_record_retries_then_succeeds() {
    let resolver = Arc::new(FakeResolver::new(Behavior::FailTimes(2)));
    let params = record_params(
        &resolver,
        2,
        Duration::from_millis(1),
        Duration::from_secs(5),
        CancellationToken::new(),
    );

    let outcome = process_record(params).await;

    assert!(outcome.is_success());
    assert_eq!(resolver.calls(), 3);
}

#[tokio::test]
async fn process_record_reports_last_error_when_exhausted() {
    let resolver = Arc::new(FakeResolver::new(Behavior::FailTimes(3)));
    let params = record_params(
        &resolver,
        2,
        Duration::from_millis(1),
        Duration::from_secs(5),
        CancellationToken::new(),
    );

    match process_record(params).await {
        RecordOutcome::Failure { error, .. } => {
            assert!(matches!(
                error.as_ref(),
                Error::Resolve(ResolveError::MissingLocation)
            ));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(resolver.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn process_record_times_out_each_attempt() {
    let resolver = Arc::new(FakeResolver::new(Behavior::SucceedThenHang(0)));
    let params = record_params(
        &resolver,
        1,
        Duration::from_secs(1),
        Duration::from_secs(1),
        CancellationToken::new(),
    );

    match process_record(params).await {
        RecordOutcome::Failure { error, .. } => assert!(matches!(
            error.as_ref(),
            Error::Timeout {
                operation: "record attempt",
                ..
            }
        )),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(resolver.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn process_record_stops_during_retry_delay_when_cancelled() {
    let resolver = Arc::new(FakeResolver::new(Behavior::Fail));
    let token = CancellationToken::new();
    let params = record_params(
        &resolver,
        2,
        Duration::from_secs(60),
        Duration::from_secs(5),
        token.clone(),
    );
    let start = tokio::time::Instant::now();

    let handle = tokio::spawn(process_record(params));
    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();

    let outcome = handle.await.unwrap();
    match outcome {
        RecordOutcome::Failure { error, .. } => assert!(error.is_cancelled()),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(resolver.calls(), 1, "no retry after cancellation");
    assert!(start.elapsed() < Duration::from_secs(60));
}

// -----------------------------------------------------------------------
// run_attempt: store normalization
// -----------------------------------------------------------------------

#[tokio::test]
async fn empty_store_is_filled_to_target_and_resolved() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let task = make_task(&store, &resolver, test_config(140, 8), CancellationToken::new());

    let summary = task.run_attempt(0).await.unwrap();

    assert_eq!(store.inserted.load(Ordering::SeqCst), 140);
    assert_eq!(store.deleted.load(Ordering::SeqCst), 0);
    assert_eq!(resolver.calls(), 140);
    assert_eq!(summary.succeeded(), 140);
    assert_eq!(summary.chunks, 18);
    assert!(summary.is_complete());

    let batches = store.update_batches();
    assert_eq!(batches.len(), 18, "one write per chunk");
    assert!(batches.iter().all(|b| b.len() <= 8));

    let records = store.snapshot();
    assert_eq!(records.len(), 140);
    assert!(records.iter().all(Record::is_resolved));
}

#[tokio::test]
async fn full_store_clears_urls_then_resolves_without_insert_or_delete() {
    let store = Arc::new(FakeStore::with_records(140, Some("https://old/x.jpg")));
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let task = make_task(&store, &resolver, test_config(140, 8), CancellationToken::new());

    task.run_attempt(0).await.unwrap();

    assert_eq!(store.inserted.load(Ordering::SeqCst), 0);
    assert_eq!(store.deleted.load(Ordering::SeqCst), 0);

    let batches = store.update_batches();
    assert_eq!(batches[0].len(), 140);
    assert!(batches[0].iter().all(|r| r.url.is_none()), "urls cleared first");
    assert_eq!(batches.len(), 1 + 18);

    let records = store.snapshot();
    assert!(
        records
            .iter()
            .all(|r| r.url.as_deref().is_some_and(|u| u.starts_with("https://img/")))
    );
}

#[tokio::test]
async fn overfull_store_keeps_first_records_by_insertion_order() {
    let store = Arc::new(FakeStore::with_records(150, None));
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let task = make_task(&store, &resolver, test_config(140, 8), CancellationToken::new());

    task.run_attempt(0).await.unwrap();

    assert_eq!(store.deleted.load(Ordering::SeqCst), 10);
    assert_eq!(store.delete_batches.load(Ordering::SeqCst), 1, "excess is trimmed in one write");
    assert_eq!(store.inserted.load(Ordering::SeqCst), 0);
    let ids: Vec<i64> = store.snapshot().iter().map(|r| r.id.0).collect();
    assert_eq!(ids, (1..=140).collect::<Vec<_>>());
    assert_eq!(resolver.calls(), 140);
}

#[tokio::test]
async fn partially_filled_store_only_resolves_new_records() {
    let store = Arc::new(FakeStore::with_records(5, Some("https://old/x.jpg")));
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let task = make_task(&store, &resolver, test_config(12, 4), CancellationToken::new());

    let summary = task.run_attempt(0).await.unwrap();

    assert_eq!(store.inserted.load(Ordering::SeqCst), 7);
    assert_eq!(summary.total, 7);
    assert_eq!(resolver.calls(), 7);
    let records = store.snapshot();
    assert_eq!(records.len(), 12);
    assert!(
        records[..5]
            .iter()
            .all(|r| r.url.as_deref() == Some("https://old/x.jpg"))
    );
}

#[tokio::test]
async fn repeated_syncs_converge_to_target() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let task = make_task(&store, &resolver, test_config(20, 8), CancellationToken::new());

    let mut previous_ids = None;
    for _ in 0..3 {
        assert_eq!(task.execute(0).await, SyncOutcome::Done);

        let records = store.snapshot();
        assert_eq!(records.len(), 20);
        assert!(records.iter().all(Record::is_resolved));

        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        if let Some(previous) = previous_ids.replace(ids.clone()) {
            assert_eq!(previous, ids, "ids are stable once at target");
        }
    }
    assert_eq!(store.inserted.load(Ordering::SeqCst), 20);
}

// -----------------------------------------------------------------------
// populate: chunk failures
// -----------------------------------------------------------------------

#[tokio::test]
async fn store_write_failure_only_fails_its_chunk() {
    let store = Arc::new(FakeStore {
        fail_update_call: Some(1),
        ..FakeStore::default()
    });
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let task = make_task(&store, &resolver, test_config(24, 8), CancellationToken::new());

    let summary = task.run_attempt(0).await.unwrap();

    assert_eq!(summary.chunks, 3, "later chunks still run");
    assert_eq!(summary.succeeded(), 16);
    assert_eq!(summary.failed(), 8);

    let mut positions: Vec<usize> = summary.failures.iter().map(|f| f.position).collect();
    positions.sort_unstable();
    assert_eq!(positions, (9..=16).collect::<Vec<_>>());
    assert!(
        summary
            .failures
            .iter()
            .all(|f| f.error.to_string() == "disk full")
    );

    let unresolved: Vec<i64> = store
        .snapshot()
        .iter()
        .filter(|r| !r.is_resolved())
        .map(|r| r.id.0)
        .collect();
    assert_eq!(unresolved, (9..=16).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn chunk_timeout_fails_only_pending_records() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::SucceedThenHang(5)));
    let mut config = test_config(8, 8);
    config.batch.network_timeout = Duration::from_secs(1);
    config.batch.retry_delay = Duration::from_secs(5);
    let task = make_task(&store, &resolver, config, CancellationToken::new());

    let summary = task.run_attempt(0).await.unwrap();

    assert_eq!(summary.succeeded(), 5);
    assert_eq!(summary.failed(), 3);
    assert!(summary.failures.iter().all(|f| matches!(
        f.error.as_ref(),
        Error::Timeout {
            operation: "chunk",
            ..
        }
    )));
    assert_eq!(store.update_batches()[0].len(), 5);
}

#[tokio::test]
async fn panicking_record_task_fails_only_its_record() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::PanicOnCall(3)));
    let task = make_task(&store, &resolver, test_config(8, 8), CancellationToken::new());

    let summary = task.run_attempt(0).await.unwrap();

    assert_eq!(summary.succeeded(), 7);
    assert_eq!(summary.failed(), 1);
    assert!(
        summary.failures[0]
            .error
            .to_string()
            .contains("did not complete")
    );

    let mut seen: Vec<i64> = summary
        .resolved
        .iter()
        .map(|id| id.0)
        .chain(summary.failures.iter().map(|f| f.id.0))
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (1..=8).collect::<Vec<_>>(), "every record reported exactly once");

    assert_eq!(store.update_batches()[0].len(), 7);
}

#[tokio::test(start_paused = true)]
async fn populate_timeout_fails_the_attempt() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::SucceedThenHang(0)));
    let mut config = test_config(16, 8);
    config.batch.network_timeout = Duration::from_secs(1);
    config.batch.retry_delay = Duration::from_secs(5);
    config.batch.batch_timeout = Duration::from_secs(3);
    let task = make_task(&store, &resolver, config, CancellationToken::new());

    let err = task.run_attempt(0).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Timeout {
            operation: "populate",
            ..
        }
    ));

    assert_eq!(task.execute(0).await, SyncOutcome::RetryRequested);
}

// -----------------------------------------------------------------------
// execute: retry envelope
// -----------------------------------------------------------------------

#[tokio::test]
async fn all_records_failing_fails_the_attempt() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::Fail));
    let mut config = test_config(8, 8);
    config.batch.record_max_retries = 0;
    let task = make_task(&store, &resolver, config, CancellationToken::new());

    assert_eq!(task.execute(0).await, SyncOutcome::RetryRequested);
    assert_eq!(task.execute(1).await, SyncOutcome::PermanentlyFailed);
}

#[tokio::test]
async fn partial_failure_is_done() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::FailTimes(2)));
    let mut config = test_config(8, 8);
    config.batch.record_max_retries = 0;
    let task = make_task(&store, &resolver, config, CancellationToken::new());

    let summary = task.run_attempt(0).await.unwrap();
    assert_eq!(summary.failed(), 2);
    assert_eq!(summary.succeeded(), 6);
}

#[tokio::test]
async fn store_error_during_setup_requests_retry() {
    let store = Arc::new(FakeStore {
        fail_list: true,
        ..FakeStore::default()
    });
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let task = make_task(&store, &resolver, test_config(8, 8), CancellationToken::new());

    assert_eq!(task.execute(0).await, SyncOutcome::RetryRequested);
    assert_eq!(task.execute(1).await, SyncOutcome::PermanentlyFailed);
    assert_eq!(resolver.calls(), 0);
}

#[tokio::test]
async fn cancelled_before_start_is_done_without_work() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let token = CancellationToken::new();
    token.cancel();
    let task = make_task(&store, &resolver, test_config(8, 8), token);

    assert_eq!(task.execute(0).await, SyncOutcome::Done);
    assert_eq!(resolver.calls(), 0);
    assert_eq!(store.inserted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_stops_at_next_chunk_boundary() {
    let store = Arc::new(FakeStore::default());
    let token = CancellationToken::new();
    // Cancel while the second chunk is running
    let resolver = Arc::new(FakeResolver::cancelling_on(9, token.clone()));
    let task = make_task(&store, &resolver, test_config(40, 8), token);

    let summary = task.run_attempt(0).await.unwrap();

    assert!(summary.cancelled);
    assert!(!summary.is_complete());
    assert_eq!(summary.chunks, 2);
    assert_eq!(summary.processed(), 16);
    assert!(resolver.calls() <= 16);

    assert_eq!(task.execute(0).await, SyncOutcome::Done);
}

#[tokio::test]
async fn events_follow_sync_lifecycle() {
    let store = Arc::new(FakeStore::default());
    let resolver = Arc::new(FakeResolver::new(Behavior::Succeed));
    let (event_tx, mut event_rx) = broadcast::channel(64);
    let task = SyncTask::new(
        store,
        resolver,
        Arc::new(EventProgress::new(event_tx)),
        Arc::new(test_config(16, 8)),
        CancellationToken::new(),
    );

    assert_eq!(task.execute(0).await, SyncOutcome::Done);

    let mut events = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(
        events[0],
        Event::SyncStarted {
            attempt: 0,
            total: 16
        }
    ));
    let processed: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            Event::Progress(p) => Some(p.processed),
            _ => None,
        })
        .collect();
    assert_eq!(processed, vec![8, 16]);
    assert!(matches!(
        events.last(),
        Some(Event::SyncComplete { succeeded: 16 })
    ));
}
