//! Record CRUD, batch writes and live snapshots.

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_stream::wrappers::WatchStream;

use crate::error::DatabaseError;
use crate::store::RecordStore;
use crate::types::{Record, RecordId};
use crate::{Error, Result};

use super::Database;

fn query_failed(context: &str, e: sqlx::Error) -> Error {
    Error::Database(DatabaseError::QueryFailed(format!("{}: {}", context, e)))
}

impl Database {
    /// List all records in insertion order
    pub async fn list_records(&self) -> Result<Vec<Record>> {
        sqlx::query_as::<_, Record>("SELECT id, url FROM records ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to list records", e))
    }

    /// Get a record by ID
    pub async fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        sqlx::query_as::<_, Record>("SELECT id, url FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to get record", e))
    }

    /// Count stored records
    pub async fn count_records(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to count records", e))?;
        Ok(count as usize)
    }

    /// Insert a single record
    pub async fn insert_record(&self, record: &Record) -> Result<RecordId> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("INSERT INTO records (url, created_at) VALUES (?, ?)")
            .bind(&record.url)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to insert record", e))?;

        self.publish_snapshot().await;
        Ok(RecordId(result.last_insert_rowid()))
    }

    /// Insert multiple records in one transaction, returning ids in input order
    pub async fn insert_records(&self, records: &[Record]) -> Result<Vec<RecordId>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_failed("Failed to begin transaction", e))?;

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let result = sqlx::query("INSERT INTO records (url, created_at) VALUES (?, ?)")
                .bind(&record.url)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| query_failed("Failed to insert records batch", e))?;
            ids.push(RecordId(result.last_insert_rowid()));
        }

        tx.commit()
            .await
            .map_err(|e| query_failed("Failed to commit records batch", e))?;

        self.publish_snapshot().await;
        Ok(ids)
    }

    /// Overwrite a record's URL
    pub async fn update_record(&self, record: &Record) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("UPDATE records SET url = ?, updated_at = ? WHERE id = ?")
            .bind(&record.url)
            .bind(now)
            .bind(record.id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to update record", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "record {}",
                record.id
            ))));
        }

        self.publish_snapshot().await;
        Ok(())
    }

    /// Overwrite multiple records in one transaction
    ///
    /// Either every record is written or none is: a missing id rolls back the batch.
    pub async fn update_records(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_failed("Failed to begin transaction", e))?;

        for record in records {
            let result = sqlx::query("UPDATE records SET url = ?, updated_at = ? WHERE id = ?")
                .bind(&record.url)
                .bind(now)
                .bind(record.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| query_failed("Failed to update records batch", e))?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls it back
                return Err(Error::Database(DatabaseError::NotFound(format!(
                    "record {}",
                    record.id
                ))));
            }
        }

        tx.commit()
            .await
            .map_err(|e| query_failed("Failed to commit records batch", e))?;

        self.publish_snapshot().await;
        Ok(())
    }

    /// Delete a record by ID
    pub async fn delete_record(&self, id: RecordId) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to delete record", e))?;

        self.publish_snapshot().await;
        Ok(())
    }

    /// Delete several records in one transaction
    ///
    /// Ids that are already gone are skipped.
    pub async fn delete_records(&self, ids: &[RecordId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_failed("Failed to begin transaction", e))?;

        for id in ids {
            sqlx::query("DELETE FROM records WHERE id = ?")
                .bind(*id)
                .execute(&mut *tx)
                .await
                .map_err(|e| query_failed("Failed to delete records batch", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| query_failed("Failed to commit delete batch", e))?;

        self.publish_snapshot().await;
        Ok(())
    }

    /// Delete every record
    pub async fn delete_all_records(&self) -> Result<()> {
        sqlx::query("DELETE FROM records")
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to delete records", e))?;

        self.publish_snapshot().await;
        Ok(())
    }

    /// Subscribe to the latest record list
    pub fn watch_records(&self) -> tokio::sync::watch::Receiver<Vec<Record>> {
        self.snapshot.subscribe()
    }

    /// Re-read the table and push it to snapshot subscribers
    ///
    /// A failed read leaves the previous snapshot in place. Publishers are serialized, so
    /// a slower reader can never overwrite a newer snapshot with an older one.
    pub(super) async fn publish_snapshot(&self) {
        let _guard = self.publish_lock.lock().await;
        match self.list_records().await {
            Ok(records) => {
                self.snapshot.send_replace(records);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh record snapshot");
            }
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for Database {
    async fn list_all(&self) -> Result<Vec<Record>> {
        self.list_records().await
    }

    fn stream_all(&self) -> BoxStream<'static, Vec<Record>> {
        WatchStream::new(self.watch_records()).boxed()
    }

    async fn insert_one(&self, record: &Record) -> Result<RecordId> {
        self.insert_record(record).await
    }

    async fn insert_many(&self, records: &[Record]) -> Result<Vec<RecordId>> {
        self.insert_records(records).await
    }

    async fn update_one(&self, record: &Record) -> Result<()> {
        self.update_record(record).await
    }

    async fn update_many(&self, records: &[Record]) -> Result<()> {
        self.update_records(records).await
    }

    async fn delete_one(&self, record: &Record) -> Result<()> {
        self.delete_record(record.id).await
    }

    async fn delete_many(&self, records: &[Record]) -> Result<()> {
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        self.delete_records(&ids).await
    }

    async fn delete_all(&self) -> Result<()> {
        self.delete_all_records().await
    }
}
