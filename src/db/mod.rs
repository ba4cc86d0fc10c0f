//! Database layer for picsync
//!
//! SQLite implementation of the [`RecordStore`](crate::store::RecordStore) contract.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`records`] — Record CRUD, batch writes and live snapshots

use crate::types::Record;
use sqlx::sqlite::SqlitePool;
use tokio::sync::{Mutex, watch};

mod migrations;
mod records;

/// Database handle for picsync
pub struct Database {
    pool: SqlitePool,
    /// Latest full record list, republished after every mutation
    snapshot: watch::Sender<Vec<Record>>,
    /// Held across read-and-send so snapshots are published in commit order
    publish_lock: Mutex<()>,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
