pub mod memory;

#[cfg(feature = "dynamodb-backend")]
pub mod dynamo;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::record::SessionRecord;

pub use memory::MemoryBackend;

#[cfg(feature = "dynamodb-backend")]
pub use dynamo::DynamoBackend;

/// What a backend reports about an existing table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDescription {
    /// Name of the hash (partition) key attribute.
    pub partition_key: Option<String>,
    /// Attribute with time-to-live enabled, if any.
    pub ttl_attribute: Option<String>,
}

/// Point operations against a named key-value table.
///
/// Implementations are shared across request handlers and must not keep
/// per-request state. Errors are returned as-is; callers decide whether to retry.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Fetch a record by identifier. A missing record is `Ok(None)`.
    async fn get_item(&self, table: &str, id: &str) -> Result<Option<SessionRecord>, BackendError>;

    /// Insert or overwrite a record.
    async fn put_item(&self, table: &str, record: &SessionRecord) -> Result<(), BackendError>;

    /// Remove a record. Removing a missing record succeeds.
    async fn delete_item(&self, table: &str, id: &str) -> Result<(), BackendError>;

    /// Describe a table; `BackendError::TableNotFound` if it does not exist.
    async fn describe_table(&self, table: &str) -> Result<TableDescription, BackendError>;

    /// Create an on-demand table keyed by a single string partition key.
    async fn create_table(&self, table: &str, partition_key: &str) -> Result<(), BackendError>;

    /// Turn on time-to-live expiry for `attribute`.
    async fn enable_time_to_live(&self, table: &str, attribute: &str) -> Result<(), BackendError>;
}
