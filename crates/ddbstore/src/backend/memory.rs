use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{SessionBackend, TableDescription};
use crate::error::BackendError;
use crate::record::SessionRecord;

#[derive(Debug, Default)]
struct MemoryTable {
    partition_key: String,
    ttl_attribute: Option<String>,
    items: HashMap<String, SessionRecord>,
}

/// In-process backend for tests and single-node development.
///
/// Behaves like DynamoDB for the operations the store uses: tables must be
/// created before use, duplicate creates are rejected, deletes are idempotent.
/// A few knobs simulate the failures a real table produces.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: DashMap<String, MemoryTable>,
    create_calls: AtomicUsize,
    ttl_failures: AtomicU32,
    outage: RwLock<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` TTL updates, as a table still being created would.
    pub fn fail_next_ttl_updates(&self, n: u32) {
        self.ttl_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every operation with `message` until cleared with `None`.
    pub fn set_outage(&self, message: Option<&str>) {
        if let Ok(mut outage) = self.outage.write() {
            *outage = message.map(str::to_string);
        }
    }

    /// Number of `create_table` calls that reached the backend.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn item_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.items.len()).unwrap_or(0)
    }

    fn check_outage(&self, operation: &'static str) -> Result<(), BackendError> {
        match self.outage.read() {
            Ok(outage) => match outage.as_ref() {
                Some(message) => Err(BackendError::Request {
                    operation,
                    message: message.clone(),
                }),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn get_item(&self, table: &str, id: &str) -> Result<Option<SessionRecord>, BackendError> {
        self.check_outage("GetItem")?;
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        let item = t.items.get(id).cloned();
        Ok(item)
    }

    async fn put_item(&self, table: &str, record: &SessionRecord) -> Result<(), BackendError> {
        self.check_outage("PutItem")?;
        let mut t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        t.items.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_item(&self, table: &str, id: &str) -> Result<(), BackendError> {
        self.check_outage("DeleteItem")?;
        let mut t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        t.items.remove(id);
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> Result<TableDescription, BackendError> {
        self.check_outage("DescribeTable")?;
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        let desc = TableDescription {
            partition_key: Some(t.partition_key.clone()),
            ttl_attribute: t.ttl_attribute.clone(),
        };
        Ok(desc)
    }

    async fn create_table(&self, table: &str, partition_key: &str) -> Result<(), BackendError> {
        self.check_outage("CreateTable")?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match self.tables.entry(table.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(BackendError::TableExists(table.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(MemoryTable {
                    partition_key: partition_key.to_string(),
                    ..Default::default()
                });
                Ok(())
            }
        }
    }

    async fn enable_time_to_live(&self, table: &str, attribute: &str) -> Result<(), BackendError> {
        self.check_outage("UpdateTimeToLive")?;
        let pending = self.ttl_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.ttl_failures.store(pending - 1, Ordering::SeqCst);
            return Err(BackendError::Request {
                operation: "UpdateTimeToLive",
                message: format!("Table {table} is being created"),
            });
        }
        let mut t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        t.ttl_attribute = Some(attribute.to_string());
        Ok(())
    }
}
