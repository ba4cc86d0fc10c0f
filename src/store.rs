//! Record store contract consumed by the sync core.
//!
//! The sync task only needs one-shot reads and batch writes; `stream_all` exists for
//! collaborators that render the record set and want to be told about every change.

use crate::error::Result;
use crate::types::{Record, RecordId};
use futures::stream::BoxStream;

/// Persistent set of records, ordered by insertion
///
/// Implementations serialize concurrent writers themselves; callers never lock.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// All records in insertion order
    async fn list_all(&self) -> Result<Vec<Record>>;

    /// Live snapshots of the full record list, emitted after every mutation
    ///
    /// The current snapshot is yielded first.
    fn stream_all(&self) -> BoxStream<'static, Vec<Record>>;

    /// Insert one record, returning its assigned id
    async fn insert_one(&self, record: &Record) -> Result<RecordId>;

    /// Insert several records atomically, returning their ids in input order
    async fn insert_many(&self, records: &[Record]) -> Result<Vec<RecordId>>;

    /// Overwrite one record's fields
    async fn update_one(&self, record: &Record) -> Result<()>;

    /// Overwrite several records atomically
    async fn update_many(&self, records: &[Record]) -> Result<()>;

    /// Delete one record
    async fn delete_one(&self, record: &Record) -> Result<()>;

    /// Delete several records atomically, publishing one snapshot
    async fn delete_many(&self, records: &[Record]) -> Result<()>;

    /// Delete every record
    async fn delete_all(&self) -> Result<()>;
}
