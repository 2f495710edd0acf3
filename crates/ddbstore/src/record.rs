//! Persisted session records and the store that reads and writes them.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::backend::SessionBackend;
use crate::error::BackendError;
use crate::util;

/// Partition key attribute.
pub const ID_ATTRIBUTE: &str = "uuid";
/// Absolute expiry (epoch seconds), managed by the table's TTL.
pub const EXPIRATION_ATTRIBUTE: &str = "expiration";
/// Encoded session values.
pub const DATA_ATTRIBUTE: &str = "data";

/// How long a record lives in the table after its last save.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// A session as stored in the backend table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    /// Seconds since the Unix epoch after which the record is dead.
    pub expiration: i64,
    /// Encoded, authenticated payload.
    pub data: String,
}

impl SessionRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiration <= now
    }
}

/// `now + retention`, saturating at the far future.
fn expiration_after(now: i64, retention: Duration) -> i64 {
    i64::try_from(retention.as_secs())
        .ok()
        .and_then(|secs| now.checked_add(secs))
        .unwrap_or(i64::MAX)
}

/// Get, put and delete of session records in one table.
///
/// The retention window is independent from the cookie max-age: the record
/// expires on the backend's own schedule, the cookie on the client's.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn SessionBackend>,
    table: String,
    retention: Duration,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn SessionBackend>, table: impl Into<String>) -> Self {
        Self {
            backend,
            table: table.into(),
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Load a record. Records past their expiration are reported as absent,
    /// since the backend's TTL sweep may not have removed them yet.
    pub async fn get(&self, id: &str) -> Result<Option<SessionRecord>, BackendError> {
        let record = self.backend.get_item(&self.table, id).await?;
        match record {
            Some(r) if r.is_expired(util::now_unix()) => {
                debug!("Session record {} past expiration, ignoring", id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Upsert a record, stamping it with now + retention.
    ///
    /// No read-before-write: concurrent saves of one identifier are
    /// last-write-wins.
    pub async fn put(&self, id: &str, data: String) -> Result<SessionRecord, BackendError> {
        let record = SessionRecord {
            id: id.to_string(),
            expiration: expiration_after(util::now_unix(), self.retention),
            data,
        };
        self.backend.put_item(&self.table, &record).await?;
        debug!("Saved session record {} (expires {})", id, record.expiration);
        Ok(record)
    }

    /// Delete a record. Idempotent.
    pub async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.backend.delete_item(&self.table, id).await?;
        debug!("Deleted session record {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    async fn store() -> (Arc<MemoryBackend>, RecordStore) {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_table("sessions", ID_ATTRIBUTE).await.unwrap();
        let records = RecordStore::new(backend.clone(), "sessions");
        (backend, records)
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_, records) = store().await;
        assert!(records.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_, records) = store().await;
        let saved = records.put("ABC", "payload".into()).await.unwrap();
        let now = util::now_unix();
        assert!(saved.expiration >= now + 3599 && saved.expiration <= now + 3600);

        let loaded = records.get("ABC").await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (backend, records) = store().await;
        records.put("ABC", "one".into()).await.unwrap();
        records.put("ABC", "two".into()).await.unwrap();
        assert_eq!(records.get("ABC").await.unwrap().unwrap().data, "two");
        assert_eq!(backend.item_count("sessions"), 1);
    }

    #[tokio::test]
    async fn test_custom_retention() {
        let (_, records) = store().await;
        let records = records.with_retention(Duration::from_secs(10));
        let saved = records.put("ABC", "x".into()).await.unwrap();
        assert!(saved.expiration <= util::now_unix() + 10);
    }

    #[tokio::test]
    async fn test_huge_retention_saturates() {
        let (_, records) = store().await;
        let records = records.with_retention(Duration::from_secs(u64::MAX));
        let saved = records.put("ABC", "x".into()).await.unwrap();
        assert_eq!(saved.expiration, i64::MAX);
        assert!(records.get("ABC").await.unwrap().is_some());

        assert_eq!(expiration_after(100, Duration::from_secs(i64::MAX as u64)), i64::MAX);
        assert_eq!(expiration_after(100, Duration::from_secs(60)), 160);
    }

    #[tokio::test]
    async fn test_expired_record_is_absent() {
        let (backend, records) = store().await;
        backend
            .put_item(
                "sessions",
                &SessionRecord {
                    id: "OLD".into(),
                    expiration: util::now_unix() - 5,
                    data: "stale".into(),
                },
            )
            .await
            .unwrap();
        assert!(records.get("OLD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, records) = store().await;
        records.put("ABC", "x".into()).await.unwrap();
        records.delete("ABC").await.unwrap();
        records.delete("ABC").await.unwrap();
        assert!(records.get("ABC").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let (backend, records) = store().await;
        backend.set_outage(Some("ProvisionedThroughputExceededException"));
        let err = records.put("ABC", "x".into()).await.unwrap_err();
        assert!(err.to_string().contains("ProvisionedThroughputExceededException"));
        assert!(records.get("ABC").await.is_err());
        assert!(records.delete("ABC").await.is_err());
    }
}
