use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codec::{KeyPair, DEFAULT_MAX_LENGTH};
use crate::error::ConfigError;
use crate::provision::ProvisionPolicy;
use crate::record::DEFAULT_RETENTION;
use crate::session::{SessionOptions, DEFAULT_MAX_AGE};

/// Root configuration for a session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub region: String,
    /// Override the DynamoDB endpoint (DynamoDB Local, LocalStack).
    pub endpoint_url: Option<String>,
    pub table_name: String,
    /// Newest pair first; older pairs are only used to decode.
    pub key_pairs: Vec<KeyPairConfig>,
    /// Flat hex key list `[auth, enc, auth, enc, ...]`, used when `key_pairs`
    /// is empty. An odd trailing key gives a sign-only pair.
    pub keys: Vec<String>,
    /// Default session max-age in seconds. Overrides `cookie.maxAge`.
    pub max_age: i64,
    /// Encoded cookie/payload cap in bytes, 0 = unlimited.
    pub max_length: usize,
    /// Backend record lifetime after each save.
    pub retention_secs: u64,
    pub cookie: SessionOptions,
    pub provision: ProvisionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
            table_name: "session-table".to_string(),
            key_pairs: Vec::new(),
            keys: Vec::new(),
            max_age: DEFAULT_MAX_AGE,
            max_length: DEFAULT_MAX_LENGTH,
            retention_secs: DEFAULT_RETENTION.as_secs(),
            cookie: SessionOptions::default(),
            provision: ProvisionPolicy::default(),
        }
    }
}

/// Hex-encoded key pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairConfig {
    pub authentication_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

impl KeyPairConfig {
    pub fn to_key_pair(&self) -> Result<KeyPair, ConfigError> {
        let authentication = decode_hex_key(&self.authentication_key)?;
        let encryption = self
            .encryption_key
            .as_deref()
            .map(decode_hex_key)
            .transpose()?;
        Ok(KeyPair::new(authentication, encryption))
    }
}

fn decode_hex_key(s: &str) -> Result<Vec<u8>, ConfigError> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| ConfigError::Invalid(format!("key is not valid hex: {e}")))?;
    if bytes.is_empty() {
        return Err(ConfigError::Invalid("empty key".to_string()));
    }
    Ok(bytes)
}

/// Parse `auth_hex[:enc_hex]` entries separated by commas.
fn parse_key_list(s: &str) -> Vec<KeyPairConfig> {
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((auth, enc)) => KeyPairConfig {
                authentication_key: auth.trim().to_string(),
                encryption_key: Some(enc.trim().to_string()),
            },
            None => KeyPairConfig {
                authentication_key: entry.to_string(),
                encryption_key: None,
            },
        })
        .collect()
}

impl StoreConfig {
    /// Decode the configured key pairs. At least one is required.
    pub fn key_pairs(&self) -> Result<Vec<KeyPair>, ConfigError> {
        if !self.key_pairs.is_empty() {
            return self.key_pairs.iter().map(KeyPairConfig::to_key_pair).collect();
        }
        if self.keys.is_empty() {
            return Err(ConfigError::NoKeys);
        }
        let flat = self
            .keys
            .iter()
            .map(|k| decode_hex_key(k))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeyPair::from_flat(&flat))
    }
}

/// Load configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load configuration from environment variables.
///
/// `DDBSTORE_CONFIG` holds the full JSON; otherwise individual variables are
/// applied over the defaults.
pub fn load_config_from_env() -> Result<StoreConfig, ConfigError> {
    if let Ok(json) = std::env::var("DDBSTORE_CONFIG") {
        return Ok(serde_json::from_str(&json)?);
    }

    let mut cfg = StoreConfig::default();

    if let Ok(v) = std::env::var("AWS_REGION") {
        cfg.region = v;
    }
    if let Ok(v) = std::env::var("DDBSTORE_ENDPOINT_URL") {
        cfg.endpoint_url = Some(v);
    }
    if let Ok(v) = std::env::var("DDBSTORE_TABLE") {
        cfg.table_name = v;
    }
    if let Ok(v) = std::env::var("DDBSTORE_KEYS") {
        cfg.key_pairs = parse_key_list(&v);
    }
    if let Ok(v) = std::env::var("DDBSTORE_MAX_AGE") {
        cfg.max_age = v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("DDBSTORE_MAX_AGE: {v}")))?;
    }
    if let Ok(v) = std::env::var("DDBSTORE_MAX_LENGTH") {
        cfg.max_length = v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("DDBSTORE_MAX_LENGTH: {v}")))?;
    }

    Ok(cfg)
}

/// Persist configuration as pretty JSON.
pub fn save_config(config: &StoreConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
