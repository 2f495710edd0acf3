//! Startup-time table provisioning.
//!
//! Run once when a store is built: make sure the session table exists with a
//! string `uuid` partition key and TTL enabled on `expiration`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::SessionBackend;
use crate::error::{BackendError, ProvisionError};
use crate::record::{EXPIRATION_ATTRIBUTE, ID_ATTRIBUTE};

/// Bounds on waiting for a freshly created table to accept a TTL update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisionPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ProvisionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 16_000,
        }
    }
}

impl ProvisionPolicy {
    fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        if current.is_zero() {
            return self.initial_backoff();
        }
        (current * 2).min(Duration::from_millis(self.max_backoff_ms))
    }
}

/// Make sure `table` exists and expires records by [`EXPIRATION_ATTRIBUTE`].
///
/// Any describe failure other than "not found" is fatal. A create rejected
/// because another instance got there first counts as success.
pub async fn ensure_table(
    backend: &dyn SessionBackend,
    table: &str,
    policy: &ProvisionPolicy,
) -> Result<(), ProvisionError> {
    match backend.describe_table(table).await {
        Ok(desc) => {
            if desc.partition_key.as_deref() != Some(ID_ATTRIBUTE) {
                return Err(ProvisionError::SchemaMismatch {
                    table: table.to_string(),
                    expected: ID_ATTRIBUTE,
                    found: desc.partition_key,
                });
            }
            if desc.ttl_attribute.as_deref() == Some(EXPIRATION_ATTRIBUTE) {
                return Ok(());
            }
            info!("Session table {} exists without TTL, enabling it", table);
            enable_ttl(backend, table, policy, Duration::ZERO).await
        }
        Err(BackendError::TableNotFound(_)) => {
            match backend.create_table(table, ID_ATTRIBUTE).await {
                Ok(()) => info!("Created session table {}", table),
                Err(BackendError::TableExists(_)) => {
                    info!("Session table {} created concurrently by another instance", table);
                    // The other instance may have finished TTL setup already.
                    if let Ok(desc) = backend.describe_table(table).await {
                        if desc.ttl_attribute.as_deref() == Some(EXPIRATION_ATTRIBUTE) {
                            return Ok(());
                        }
                    }
                }
                Err(source) => {
                    return Err(ProvisionError::Create {
                        table: table.to_string(),
                        source,
                    })
                }
            }
            // The table is still materializing right after creation.
            enable_ttl(backend, table, policy, policy.initial_backoff()).await
        }
        Err(source) => Err(ProvisionError::Describe {
            table: table.to_string(),
            source,
        }),
    }
}

async fn enable_ttl(
    backend: &dyn SessionBackend,
    table: &str,
    policy: &ProvisionPolicy,
    first_wait: Duration,
) -> Result<(), ProvisionError> {
    let attempts = policy.max_attempts.max(1);
    let mut wait = first_wait;
    let mut last_err = None;

    for attempt in 1..=attempts {
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        match backend.enable_time_to_live(table, EXPIRATION_ATTRIBUTE).await {
            Ok(()) => {
                info!(
                    "Enabled TTL on {}.{} (attempt {})",
                    table, EXPIRATION_ATTRIBUTE, attempt
                );
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "TTL update on {} failed (attempt {}/{}): {}",
                    table, attempt, attempts, e
                );
                last_err = Some(e);
            }
        }
        wait = policy.next_backoff(wait);
    }

    Err(ProvisionError::TimedOut {
        table: table.to_string(),
        attempts,
        source: last_err.unwrap_or_else(|| BackendError::Request {
            operation: "UpdateTimeToLive",
            message: "no attempts made".into(),
        }),
    })
}
