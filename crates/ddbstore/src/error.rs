use std::path::PathBuf;

/// Core error type for the session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Invalid cookie header: {0}")]
    InvalidHeader(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No key pairs configured")]
    NoKeys,
}

/// Errors from encoding or decoding a cookie value.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Authentication key is not set")]
    HashKeyNotSet,

    #[error("No codecs configured")]
    NoCodecs,

    #[error("Encoded value is too long ({len} > {max} bytes)")]
    TooLong { len: usize, max: usize },

    #[error("Failed to serialize value: {0}")]
    Serialize(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Malformed value: {0}")]
    Malformed(String),

    #[error("The value is not valid (authentication failed)")]
    MacInvalid,

    #[error("Timestamp expired")]
    Expired,

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Failed to deserialize value: {0}")]
    Deserialize(String),
}

impl CodecError {
    /// Whether this error came from rejecting an inbound value.
    ///
    /// Decode errors mean "no valid session"; everything else is a failure of
    /// the store itself and must reach the caller.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            CodecError::TooLong { .. }
                | CodecError::Malformed(_)
                | CodecError::MacInvalid
                | CodecError::Expired
                | CodecError::Decryption(_)
                | CodecError::Deserialize(_)
        )
    }
}

/// Errors surfaced by a key-value backend. Never retried by the store.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Failed to describe table {table}: {source}")]
    Describe {
        table: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed to create table {table}: {source}")]
    Create {
        table: String,
        #[source]
        source: BackendError,
    },

    #[error("Table {table} has partition key {found:?}, expected {expected}")]
    SchemaMismatch {
        table: String,
        expected: &'static str,
        found: Option<String>,
    },

    #[error("Timed out enabling TTL on {table} after {attempts} attempts: {source}")]
    TimedOut {
        table: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
