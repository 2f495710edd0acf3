use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use http::HeaderMap;

use crate::error::Result;
use crate::session::Session;

/// Trait for session stores used by request handlers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Build the session `name` for a request, loading it when the request
    /// carries a valid cookie for it. Never cached.
    async fn new_session(&self, request: &HeaderMap, name: &str) -> Result<Session>;

    /// Persist the session and append its `Set-Cookie` header to `response`.
    async fn save(&self, response: &mut HeaderMap, session: &mut Session) -> Result<()>;

    /// Return the session `name` held by `registry`, loading it on first use.
    async fn get_or_create_session<'r, 'req>(
        &self,
        registry: &'r mut SessionRegistry<'req>,
        name: &str,
    ) -> Result<&'r mut Session> {
        let request = registry.request;
        match registry.sessions.entry(name.to_string()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let session = self.new_session(request, name).await?;
                Ok(slot.insert(session))
            }
        }
    }
}

/// Sessions loaded during one request, keyed by name.
pub struct SessionRegistry<'req> {
    request: &'req HeaderMap,
    sessions: HashMap<String, Session>,
}

impl<'req> SessionRegistry<'req> {
    pub fn new(request: &'req HeaderMap) -> Self {
        Self {
            request,
            sessions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Save every session in the registry.
    pub async fn save_all(
        &mut self,
        store: &dyn SessionStore,
        response: &mut HeaderMap,
    ) -> Result<()> {
        for session in self.sessions.values_mut() {
            store.save(response, session).await?;
        }
        Ok(())
    }
}
