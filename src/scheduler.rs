//! Periodic background sync
//!
//! [`SyncScheduler`] runs [`SyncService::sync_now`] once immediately and then every
//! `sync.interval` until the service shuts down or the scheduler's own token is cancelled.
//!
//! # Example
//!
//! ```no_run
//! use picsync::{Config, SyncService};
//! use picsync::scheduler::SyncScheduler;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = SyncService::new(Config::default()).await?;
//! let scheduler = SyncScheduler::new(service.clone());
//!
//! // Runs until the service shuts down
//! tokio::spawn(scheduler.run());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::service::SyncService;

/// Shortest period a ticker accepts; zero would panic inside tokio
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Background task that triggers a sync on a fixed interval
pub struct SyncScheduler {
    service: SyncService,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl SyncScheduler {
    /// Schedule syncs every `sync.interval` of the service's configuration
    pub fn new(service: SyncService) -> Self {
        let interval = service.config().sync.interval.max(MIN_INTERVAL);
        let cancel_token = service.shutdown_token().child_token();
        Self {
            service,
            interval,
            cancel_token,
        }
    }

    /// Override the interval (clamped to at least 1 ms)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!(?interval, "Sync interval too short, clamping to 1ms");
        }
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Token that stops this scheduler (also cancelled on service shutdown)
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Run until cancelled
    ///
    /// A failed sync is logged and the schedule continues; the next run happens at the
    /// next tick. Ticks missed while a sync is running are skipped, not replayed.
    pub async fn run(self) {
        info!(interval_ms = self.interval.as_millis() as u64, "Sync scheduler started");

        let mut ticker = tokio::time::interval_at(Instant::now(), self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Sync scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("Scheduled sync due");
                    match self.service.sync_now().await {
                        Ok(()) => debug!("Scheduled sync finished"),
                        Err(e) if e.is_cancelled() => {
                            info!("Sync scheduler shutting down");
                            break;
                        }
                        Err(e) => warn!(error = %e, "Scheduled sync failed"),
                    }
                }
            }
        }
    }
}
