//! DynamoDB-backed HTTP sessions.
//!
//! Session values live in a key-value table; the client only holds an
//! authenticated, encrypted cookie carrying the session identifier.

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod provision;
pub mod record;
pub mod session;
pub mod util;

pub use codec::KeyPair;
pub use config::StoreConfig;
pub use error::{Result, SessionError};
pub use session::{DdbStore, Session, SessionOptions, SessionOrigin, SessionRegistry, SessionStore};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
