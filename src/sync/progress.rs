//! Progress bridge between the sync core and whoever renders it.
//!
//! Sinks are fire-and-forget: the core never waits on them and never learns whether
//! anyone is listening.

use tokio::sync::broadcast;

use crate::error::Error;
use crate::types::{Event, SyncProgress};

use super::outcome::PopulateSummary;

/// Receiver of sync lifecycle notifications
pub trait ProgressSink: Send + Sync {
    /// A chunk finished; counters are cumulative for the current run
    fn report(&self, progress: SyncProgress);

    /// An attempt is about to resolve `total` records
    fn started(&self, _attempt: u32, _total: usize) {}

    /// A populate run finished (possibly with per-record failures)
    fn finished(&self, _summary: &PopulateSummary) {}

    /// An attempt failed as a whole
    fn failed(&self, _attempt: u32, _error: &Error, _will_retry: bool) {}

    /// The host cancelled the sync
    fn cancelled(&self) {}
}

/// [`ProgressSink`] that republishes everything as [`Event`]s on a broadcast channel
#[derive(Clone)]
pub struct EventProgress {
    event_tx: broadcast::Sender<Event>,
}

impl EventProgress {
    /// Publish onto `event_tx`
    pub fn new(event_tx: broadcast::Sender<Event>) -> Self {
        Self { event_tx }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

impl ProgressSink for EventProgress {
    fn report(&self, progress: SyncProgress) {
        self.emit(Event::Progress(progress));
    }

    fn started(&self, attempt: u32, total: usize) {
        self.emit(Event::SyncStarted { attempt, total });
    }

    fn finished(&self, summary: &PopulateSummary) {
        let event = if summary.failed() == 0 {
            Event::SyncComplete {
                succeeded: summary.succeeded(),
            }
        } else {
            Event::SyncCompletedWithFailures {
                succeeded: summary.succeeded(),
                failed: summary.failed(),
            }
        };
        self.emit(event);
    }

    fn failed(&self, attempt: u32, error: &Error, will_retry: bool) {
        self.emit(Event::SyncFailed {
            attempt,
            error: error.to_string(),
            will_retry,
        });
    }

    fn cancelled(&self) {
        self.emit(Event::SyncCancelled);
    }
}

/// [`ProgressSink`] that drops every notification
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _progress: SyncProgress) {}
}
