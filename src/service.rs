//! Service facade that owns the collaborators and plays the host's role.
//!
//! [`SyncService`] wires the SQLite store, the HTTP resolver and the event channel
//! together, runs at most one sync at a time and re-runs a failed attempt after the
//! configured backoff for as long as the retry budget allows.

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::resolver::{RedirectResolver, UrlResolver};
use crate::store::RecordStore;
use crate::sync::{AttemptState, EventProgress, SyncTask, Terminal};
use crate::types::{Event, Record, SyncOutcome};

/// Entry point for embedding applications (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn RecordStore>,
    resolver: Arc<dyn UrlResolver>,
    event_tx: broadcast::Sender<Event>,
    config: Arc<Config>,
    /// Cancelled once on shutdown; every sync runs on a child of it
    shutdown_token: CancellationToken,
    /// Token of the sync currently running, if any
    current: Arc<Mutex<Option<CancellationToken>>>,
    /// Serializes syncs so a record set is never populated twice concurrently
    sync_lock: Arc<Mutex<()>>,
}

impl SyncService {
    /// Open the configured database and build the HTTP resolver
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Database::new(&config.persistence.database_path).await?;
        let resolver = RedirectResolver::new(&config.resolver)?;
        tracing::info!(
            endpoint = %config.resolver.endpoint,
            database = %config.persistence.database_path.display(),
            target = config.sync.target_count,
            "Sync service initialized"
        );

        Self::with_components(config, Arc::new(db), Arc::new(resolver))
    }

    /// Build a service over caller-provided collaborators
    pub fn with_components(
        config: Config,
        store: Arc<dyn RecordStore>,
        resolver: Arc<dyn UrlResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            store,
            resolver,
            event_tx,
            config: Arc::new(config),
            shutdown_token: CancellationToken::new(),
            current: Arc::new(Mutex::new(None)),
            sync_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Subscribe to sync events
    ///
    /// Multiple subscribers are supported; events sent while nobody listens are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The record store backing this service
    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store)
    }

    /// Current records in insertion order
    pub async fn records(&self) -> Result<Vec<Record>> {
        self.store.list_all().await
    }

    /// Live snapshots of the record list
    pub fn stream_records(&self) -> BoxStream<'static, Vec<Record>> {
        self.store.stream_all()
    }

    /// Run one sync to completion, retrying failed attempts after `sync.retry_backoff`
    ///
    /// Returns `Ok(())` when an attempt succeeds or the sync is cancelled, and
    /// [`Error::SyncFailed`] once the final permitted attempt has failed. A call made
    /// while another sync runs waits for it to finish first.
    pub async fn sync_now(&self) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let _running = self.sync_lock.lock().await;
        let cancel_token = self.shutdown_token.child_token();
        *self.current.lock().await = Some(cancel_token.clone());

        let task = SyncTask::new(
            Arc::clone(&self.store),
            Arc::clone(&self.resolver),
            Arc::new(EventProgress::new(self.event_tx.clone())),
            Arc::clone(&self.config),
            cancel_token,
        );
        let result = self.drive(&task).await;

        *self.current.lock().await = None;
        result
    }

    /// Re-invoke the task until its attempt state is terminal
    async fn drive(&self, task: &SyncTask) -> Result<()> {
        let backoff = self.config.sync.retry_backoff;
        let mut state = AttemptState::start();
        let mut attempts = 0u32;
        let mut last_error = None;

        loop {
            let attempt = match state {
                AttemptState::Attempting(attempt) => attempt,
                AttemptState::Terminal(Terminal::Succeeded) => return Ok(()),
                AttemptState::Terminal(Terminal::Failed) => {
                    return Err(Error::SyncFailed {
                        attempts,
                        last_error: last_error.unwrap_or_default(),
                    });
                }
            };

            let (outcome, error) = task.execute_reporting(attempt).await;
            attempts += 1;
            if let Some(e) = error {
                last_error = Some(e.to_string());
            }
            state = state.advance(outcome);

            if outcome == SyncOutcome::RetryRequested {
                tracing::info!(
                    next_attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    "Scheduling sync retry"
                );
                tokio::select! {
                    _ = task.cancel_token().cancelled() => {
                        tracing::info!("Sync cancelled while waiting to retry");
                        self.event_tx.send(Event::SyncCancelled).ok();
                        return Ok(());
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    /// Cancel the sync that is currently running, if any
    ///
    /// Later calls to [`sync_now`](Self::sync_now) are unaffected.
    pub async fn cancel(&self) {
        if let Some(token) = self.current.lock().await.as_ref() {
            tracing::info!("Cancelling running sync");
            token.cancel();
        }
    }

    /// Whether a sync is running right now
    pub async fn is_syncing(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Token that is cancelled on [`shutdown`](Self::shutdown)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Cancel all work and wait (bounded) for a running sync to wind down
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");
        self.shutdown_token.cancel();

        let shutdown_timeout = std::time::Duration::from_secs(30);
        match tokio::time::timeout(shutdown_timeout, self.sync_lock.lock()).await {
            Ok(_idle) => tracing::info!("Sync service stopped"),
            Err(_) => tracing::warn!("Timeout waiting for running sync, proceeding with shutdown"),
        }
        Ok(())
    }
}
