//! Cookie codecs with key rotation.
//!
//! A [`Codecs`] chain holds one [`SecureCookie`] per configured key pair.
//! Encoding uses the first pair that succeeds; decoding accepts a value that
//! any pair authenticates, so new keys can be put in front of old ones without
//! logging every client out.

pub mod secure_cookie;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::util;

pub use secure_cookie::{SecureCookie, DEFAULT_MAX_LENGTH};

/// One authentication key plus an optional encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub authentication: Vec<u8>,
    pub encryption: Option<Vec<u8>>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("authentication", &format_args!("<{} bytes>", self.authentication.len()))
            .field("encrypted", &self.encryption.is_some())
            .finish()
    }
}

impl KeyPair {
    pub fn new(authentication: impl Into<Vec<u8>>, encryption: Option<Vec<u8>>) -> Self {
        Self {
            authentication: authentication.into(),
            encryption,
        }
    }

    /// A fresh random pair: 64-byte authentication key, 32-byte encryption key.
    pub fn generate() -> Self {
        Self {
            authentication: util::random_bytes(64),
            encryption: Some(util::random_bytes(32)),
        }
    }

    /// Pair up a flat key list as authentication, encryption, authentication, ...
    ///
    /// An odd-length list leaves the last pair without an encryption key.
    pub fn from_flat(keys: &[Vec<u8>]) -> Vec<KeyPair> {
        keys.chunks(2)
            .map(|chunk| KeyPair {
                authentication: chunk[0].clone(),
                encryption: chunk.get(1).cloned(),
            })
            .collect()
    }
}

/// Ordered codec chain built from key pairs, newest first.
#[derive(Debug, Clone)]
pub struct Codecs {
    codecs: Vec<SecureCookie>,
}

impl Codecs {
    pub fn from_key_pairs(pairs: &[KeyPair]) -> Result<Self, CodecError> {
        if pairs.is_empty() {
            return Err(CodecError::NoCodecs);
        }
        let codecs = pairs
            .iter()
            .map(|p| SecureCookie::new(&p.authentication, p.encryption.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { codecs })
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn set_max_age(&mut self, secs: i64) {
        for codec in &mut self.codecs {
            codec.set_max_age(secs);
        }
    }

    pub fn set_max_length(&mut self, len: usize) {
        for codec in &mut self.codecs {
            codec.set_max_length(len);
        }
    }

    /// Serialize `value` and encode it with the first codec that accepts it.
    pub fn encode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<String, CodecError> {
        let plaintext =
            serde_json::to_vec(value).map_err(|e| CodecError::Serialize(e.to_string()))?;

        let mut last_err = CodecError::NoCodecs;
        for codec in &self.codecs {
            match codec.encode_bytes(name, &plaintext) {
                Ok(token) => return Ok(token),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Decode `token` with each codec in order, returning the first success.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, token: &str) -> Result<T, CodecError> {
        let mut last_err = CodecError::NoCodecs;
        for codec in &self.codecs {
            match codec.decode_bytes(name, token) {
                Ok(plaintext) => {
                    return serde_json::from_slice(&plaintext)
                        .map_err(|e| CodecError::Deserialize(e.to_string()));
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pair(seed: u8) -> KeyPair {
        KeyPair::new(vec![seed; 64], Some(vec![seed.wrapping_add(1); 32]))
    }

    #[test]
    fn test_values_roundtrip() {
        let codecs = Codecs::from_key_pairs(&[pair(1)]).unwrap();
        let mut values = HashMap::new();
        values.insert("hello".to_string(), serde_json::json!("world"));
        values.insert("count".to_string(), serde_json::json!(3));

        let token = codecs.encode("session", &values).unwrap();
        let decoded: HashMap<String, serde_json::Value> = codecs.decode("session", &token).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_rotated_keys_still_decode() {
        let old = Codecs::from_key_pairs(&[pair(1)]).unwrap();
        let token = old.encode("session", "ABC123").unwrap();

        let rotated = Codecs::from_key_pairs(&[pair(7), pair(1)]).unwrap();
        let id: String = rotated.decode("session", &token).unwrap();
        assert_eq!(id, "ABC123");

        // New tokens come from the first pair only.
        let fresh = rotated.encode("session", "XYZ").unwrap();
        assert!(old.decode::<String>("session", &fresh).is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let a = Codecs::from_key_pairs(&[pair(1)]).unwrap();
        let b = Codecs::from_key_pairs(&[pair(2), pair(3)]).unwrap();
        let token = a.encode("session", "id").unwrap();
        let err = b.decode::<String>("session", &token).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_empty_pairs_rejected() {
        assert!(matches!(
            Codecs::from_key_pairs(&[]),
            Err(CodecError::NoCodecs)
        ));
    }

    #[test]
    fn test_from_flat_pairs() {
        let keys = vec![b"h1".to_vec(), b"e1".to_vec(), b"h2".to_vec()];
        let pairs = KeyPair::from_flat(&keys);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].authentication, b"h1");
        assert_eq!(pairs[0].encryption.as_deref(), Some(&b"e1"[..]));
        assert_eq!(pairs[1].authentication, b"h2");
        assert!(pairs[1].encryption.is_none());
    }

    #[test]
    fn test_max_length_surfaces_on_encode() {
        let mut codecs = Codecs::from_key_pairs(&[pair(1), pair(2)]).unwrap();
        codecs.set_max_length(100);
        let big = "x".repeat(500);
        let err = codecs.encode("session", &big).unwrap_err();
        assert!(matches!(err, CodecError::TooLong { .. }));
    }

    #[test]
    fn test_generated_pairs_differ() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a, b);
        assert_eq!(a.authentication.len(), 64);
    }
}
