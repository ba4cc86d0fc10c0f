//! # picsync
//!
//! Background synchronization of a fixed-size set of image records.
//!
//! Every record slot is filled with the concrete URL an upstream "random image"
//! endpoint redirects to. A sync trims the record store to its target size, resolves
//! URLs in chunks of bounded concurrency, persists each chunk with one batch write and
//! reports a tri-state outcome (done / retry requested / permanently failed) to the
//! host that schedules it.
//!
//! ## Design
//!
//! - **Layered retries** - the resolver retries single requests with exponential
//!   backoff, each record retries whole resolutions, and the host retries attempts
//! - **Bounded in time** - per-attempt, per-chunk and per-run timeouts
//! - **Cooperative cancellation** - checked at chunk boundaries and raced inside
//!   per-record work
//! - **Event-driven** - consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use picsync::{Config, SyncService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = SyncService::new(Config::default()).await?;
//!
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     service.sync_now().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// SQLite record store
pub mod db;
/// Error types
pub mod error;
/// Redirect resolution
pub mod resolver;
/// Retry logic with fixed or exponential backoff
pub mod retry;
/// Periodic background sync
pub mod scheduler;
/// Service facade and host retry loop
pub mod service;
/// Record store contract
pub mod store;
/// Sync task, batch orchestration and progress reporting
pub mod sync;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{BatchConfig, Config, PersistenceConfig, ResolverConfig, SyncConfig};
pub use db::Database;
pub use error::{DatabaseError, Error, ResolveError, Result};
pub use resolver::{RedirectResolver, UrlResolver};
pub use scheduler::SyncScheduler;
pub use service::SyncService;
pub use store::RecordStore;
pub use sync::{
    AttemptState, EventProgress, NoopProgress, PopulateSummary, ProgressSink, RecordOutcome,
    SyncTask,
};
pub use types::{Event, Record, RecordId, SyncOutcome, SyncProgress};

/// Run the service until a termination signal arrives, then shut it down.
///
/// Cancels any in-flight sync (and every scheduler derived from the service) and waits
/// for it to wind down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use picsync::{Config, SyncScheduler, SyncService, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = SyncService::new(Config::default()).await?;
///     tokio::spawn(SyncScheduler::new(service.clone()).run());
///
///     run_with_shutdown(service).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: SyncService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in sandboxes; a missing stream just never fires
    let register = |kind: SignalKind, name: &'static str| match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(signal = name, error = %e, "Signal handler unavailable");
            None
        }
    };
    let mut sigterm = register(SignalKind::terminate(), "SIGTERM");
    let mut sigint = register(SignalKind::interrupt(), "SIGINT");

    if sigterm.is_none() && sigint.is_none() {
        tracing::error!("No signal handlers registered, waiting on ctrl_c");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c listener failed");
        }
        return;
    }

    tokio::select! {
        Some(()) = recv_signal(sigterm.as_mut()) => {
            tracing::info!(signal = "SIGTERM", "Shutdown signal received");
        }
        Some(()) = recv_signal(sigint.as_mut()) => {
            tracing::info!(signal = "SIGINT", "Shutdown signal received");
        }
        else => tracing::warn!("Signal streams closed"),
    }
}

#[cfg(unix)]
async fn recv_signal(stream: Option<&mut tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl_c listener failed");
        return;
    }
    tracing::info!(signal = "ctrl_c", "Shutdown signal received");
}
