//! Core types for picsync

use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a record
///
/// `RecordId(0)` marks a record that has not been inserted yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Placeholder id for records that have not been inserted
    pub const UNSET: RecordId = RecordId(0);

    /// Create a new RecordId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for RecordId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RecordId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RecordId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// One image slot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Record {
    /// Store-assigned id ([`RecordId::UNSET`] before insertion)
    pub id: RecordId,
    /// Resolved image URL (`None` = not yet resolved)
    pub url: Option<String>,
}

impl Record {
    /// An empty record waiting to be inserted
    pub fn empty() -> Self {
        Self::default()
    }

    /// A record carrying a resolved URL
    pub fn resolved(id: RecordId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: Some(url.into()),
        }
    }

    /// Whether the record has a URL
    pub fn is_resolved(&self) -> bool {
        self.url.is_some()
    }
}

/// Result handed to the host scheduler after one sync attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The attempt succeeded, or the host cancelled it
    Done,
    /// The attempt failed and the retry budget allows another one
    RetryRequested,
    /// The final permitted attempt failed
    PermanentlyFailed,
}

/// Cumulative progress of one populate run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Records with a final outcome so far
    pub processed: usize,
    /// Records scheduled for this run
    pub total: usize,
    /// Records resolved and persisted
    pub succeeded: usize,
    /// Records that failed
    pub failed: usize,
}

impl SyncProgress {
    /// Percentage of processed records (100 for an empty run)
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            (self.processed as f32 / self.total as f32) * 100.0
        }
    }
}

/// Event emitted during the sync lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A sync attempt started
    SyncStarted {
        /// 0-based attempt number
        attempt: u32,
        /// Records that will be resolved in this attempt
        total: usize,
    },

    /// A chunk finished and was persisted
    Progress(SyncProgress),

    /// A populate run finished with every record resolved
    SyncComplete {
        /// Records resolved
        succeeded: usize,
    },

    /// A populate run finished with at least one failed record
    SyncCompletedWithFailures {
        /// Records resolved
        succeeded: usize,
        /// Records that failed
        failed: usize,
    },

    /// A sync attempt failed
    SyncFailed {
        /// 0-based attempt number
        attempt: u32,
        /// Error message
        error: String,
        /// Whether the host will retry
        will_retry: bool,
    },

    /// The sync was cancelled
    SyncCancelled,
}
