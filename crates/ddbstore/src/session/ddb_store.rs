//! Session store keeping values in a key-value table and only the session
//! identifier, encoded and authenticated, in the client's cookie.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use tracing::{debug, warn};

use super::cookie::{read_cookie, write_cookie};
use super::store::SessionStore;
use super::{Session, SessionOptions, SessionOrigin};
use crate::backend::SessionBackend;
use crate::codec::{Codecs, KeyPair};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::provision::{self, ProvisionPolicy};
use crate::record::RecordStore;
use crate::util;

/// Long-lived, shareable session store.
///
/// Holds no per-request state; every load and save goes to the backend.
pub struct DdbStore {
    codecs: Codecs,
    options: SessionOptions,
    records: RecordStore,
}

impl DdbStore {
    /// Build a store over `backend`, provisioning `table` first.
    ///
    /// Fails if the key list is empty or the table cannot be provisioned; no
    /// store exists in either case.
    pub async fn new(
        backend: Arc<dyn SessionBackend>,
        table: &str,
        key_pairs: &[KeyPair],
        policy: &ProvisionPolicy,
    ) -> Result<Self> {
        let codecs = Codecs::from_key_pairs(key_pairs)?;
        provision::ensure_table(backend.as_ref(), table, policy).await?;

        let mut store = Self {
            codecs,
            options: SessionOptions::default(),
            records: RecordStore::new(backend, table),
        };
        store.set_max_age(store.options.max_age);
        Ok(store)
    }

    /// Build a store from configuration over an explicit backend.
    pub async fn open(backend: Arc<dyn SessionBackend>, config: &StoreConfig) -> Result<Self> {
        let key_pairs = config.key_pairs()?;
        let mut store = Self::new(backend, &config.table_name, &key_pairs, &config.provision).await?;

        store.options = config.cookie.clone();
        store.set_max_age(config.max_age);
        store.set_max_length(config.max_length);
        store.records = store
            .records
            .with_retention(Duration::from_secs(config.retention_secs));
        Ok(store)
    }

    /// Connect to DynamoDB as configured and build a store.
    #[cfg(feature = "dynamodb-backend")]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let backend =
            crate::backend::DynamoBackend::connect(&config.region, config.endpoint_url.as_deref())
                .await;
        Self::open(Arc::new(backend), config).await
    }

    /// Default options copied into every new session.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Set the default max-age and the codecs' token age limit.
    /// A session is deleted on save when its own max-age is `<= 0`.
    pub fn set_max_age(&mut self, age: i64) {
        self.options.max_age = age;
        self.codecs.set_max_age(age);
    }

    /// Cap encoded cookie and record payload length. 0 means unlimited.
    pub fn set_max_length(&mut self, len: usize) {
        self.codecs.set_max_length(len);
    }

    /// Fill `session` from its record. Returns how the lookup went.
    async fn load(&self, session: &mut Session) -> Result<SessionOrigin> {
        let Some(record) = self.records.get(&session.id).await? else {
            debug!("No live record for session {}", session.id);
            return Ok(SessionOrigin::Missing);
        };

        match self
            .codecs
            .decode::<HashMap<String, serde_json::Value>>(session.name(), &record.data)
        {
            Ok(values) => {
                session.values = values;
                Ok(SessionOrigin::Loaded)
            }
            Err(e) if e.is_decode() => {
                warn!("Stored payload for session {} rejected: {}", session.id, e);
                Ok(SessionOrigin::Rejected)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn erase(&self, session: &Session) -> Result<()> {
        if session.id.is_empty() {
            return Ok(());
        }
        self.records.delete(&session.id).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for DdbStore {
    async fn new_session(&self, request: &HeaderMap, name: &str) -> Result<Session> {
        let mut session = Session::new(name, self.options.clone());

        let Some(token) = read_cookie(request, name) else {
            return Ok(session);
        };

        match self.codecs.decode::<String>(name, &token) {
            Ok(id) => session.id = id,
            Err(e) if e.is_decode() => {
                warn!("Rejected cookie for session {}: {}", name, e);
                session.set_origin(SessionOrigin::Rejected);
                return Ok(session);
            }
            Err(e) => return Err(e.into()),
        }

        let origin = self.load(&mut session).await?;
        if origin == SessionOrigin::Loaded {
            session.is_new = false;
        } else {
            session.id.clear();
            session.values.clear();
        }
        session.set_origin(origin);
        Ok(session)
    }

    async fn save(&self, response: &mut HeaderMap, session: &mut Session) -> Result<()> {
        if session.options.max_age <= 0 {
            self.erase(session).await?;
            debug!("Erased session {} ({})", session.id, session.name());
            // A later save in the same request must not revive the deleted id.
            session.id.clear();
            return write_cookie(response, session.name(), "", &session.options);
        }

        // Encode before touching the table so an oversized payload writes nothing.
        let data = self.codecs.encode(session.name(), &session.values)?;

        if session.id.is_empty() {
            session.id = util::generate_session_id();
        }
        let token = self.codecs.encode(session.name(), &session.id)?;

        self.records.put(&session.id, data).await?;
        write_cookie(response, session.name(), &token, &session.options)?;
        debug!("Saved session {} ({})", session.id, session.name());
        Ok(())
    }
}

impl std::fmt::Debug for DdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DdbStore")
            .field("table", &self.records.table())
            .field("codecs", &self.codecs.len())
            .field("options", &self.options)
            .finish()
    }
}
