pub mod cookie;
pub mod ddb_store;
pub mod store;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use ddb_store::DdbStore;
pub use store::{SessionRegistry, SessionStore};

/// Default cookie and session lifetime: 30 days.
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;

/// SameSite attribute for the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Cookie attributes and lifetime policy for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    pub path: String,
    pub domain: Option<String>,
    /// Cookie Max-Age in seconds. `<= 0` deletes the session on save.
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: DEFAULT_MAX_AGE,
            secure: false,
            http_only: true,
            same_site: Some(SameSite::Lax),
        }
    }
}

/// How a session came to be, decided when it was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// The request carried no cookie for this session name.
    Fresh,
    /// A cookie was present but failed authentication or decoding.
    Rejected,
    /// The cookie was valid but the table has no live record for it.
    Missing,
    /// Values were loaded from the table.
    Loaded,
}

/// Per-request session state. Never shared across requests.
#[derive(Debug, Clone)]
pub struct Session {
    /// Empty until the first save mints one.
    pub id: String,
    pub values: HashMap<String, serde_json::Value>,
    pub options: SessionOptions,
    pub is_new: bool,
    name: String,
    origin: SessionOrigin,
}

impl Session {
    pub fn new(name: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            id: String::new(),
            values: HashMap::new(),
            options,
            is_new: true,
            name: name.into(),
            origin: SessionOrigin::Fresh,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    pub(crate) fn set_origin(&mut self, origin: SessionOrigin) {
        self.origin = origin;
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Get a value deserialized into `T`; `None` if absent or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    /// Clear all values.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mark the session for deletion on the next save.
    pub fn expire(&mut self) {
        self.options.max_age = -1;
    }
}
