//! One authenticated-encryption codec: HMAC-SHA256 over a timestamped,
//! optionally AES-256-GCM encrypted value.
//!
//! Token layout (before the outer URL-safe base64):
//!   `<unix timestamp>|<base64(nonce || ciphertext)>|<hmac>`
//! where the HMAC covers `<name>|<timestamp>|<value>`, binding the token to the
//! cookie name it was issued for.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CodecError;
use crate::util;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Default cap on the encoded token length.
pub const DEFAULT_MAX_LENGTH: usize = 4096;

/// Derive the AES-256 key from an encryption key of any length.
fn derive_block_key(encryption_key: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, encryption_key);
    let mut okm = [0u8; 32];
    // A 32-byte output is always within HKDF-SHA256's limit.
    let _ = hk.expand(b"ddbstore-cookie-encryption", &mut okm);
    okm
}

/// A single codec built from one key pair.
#[derive(Clone)]
pub struct SecureCookie {
    hash_key: Vec<u8>,
    block_key: Option<[u8; 32]>,
    max_age: i64,
    max_length: usize,
}

impl std::fmt::Debug for SecureCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureCookie")
            .field("encrypted", &self.block_key.is_some())
            .field("max_age", &self.max_age)
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

impl SecureCookie {
    /// Build a codec. Without an encryption key values are signed but readable.
    pub fn new(hash_key: &[u8], encryption_key: Option<&[u8]>) -> Result<Self, CodecError> {
        if hash_key.is_empty() {
            return Err(CodecError::HashKeyNotSet);
        }
        Ok(Self {
            hash_key: hash_key.to_vec(),
            block_key: encryption_key
                .filter(|k| !k.is_empty())
                .map(derive_block_key),
            max_age: 0,
            max_length: DEFAULT_MAX_LENGTH,
        })
    }

    /// Reject tokens older than `secs` seconds. 0 disables the check.
    pub fn set_max_age(&mut self, secs: i64) {
        self.max_age = secs.max(0);
    }

    /// Cap the encoded token length. 0 means unlimited.
    pub fn set_max_length(&mut self, len: usize) {
        self.max_length = len;
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn mac(&self, name: &str, timestamp: &[u8], value: &[u8]) -> Result<HmacSha256, CodecError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hash_key)
            .map_err(|_| CodecError::HashKeyNotSet)?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp);
        mac.update(b"|");
        mac.update(value);
        Ok(mac)
    }

    /// Encode raw bytes for the cookie `name`.
    pub fn encode_bytes(&self, name: &str, plaintext: &[u8]) -> Result<String, CodecError> {
        let value = match &self.block_key {
            Some(key) => {
                let cipher = Aes256Gcm::new(key.into());
                let nonce_bytes = util::random_bytes(NONCE_LEN);
                let nonce = Nonce::from_slice(&nonce_bytes);
                let ciphertext = cipher
                    .encrypt(
                        nonce,
                        Payload {
                            msg: plaintext,
                            aad: name.as_bytes(),
                        },
                    )
                    .map_err(|e| CodecError::Encryption(e.to_string()))?;
                let mut out = nonce_bytes;
                out.extend_from_slice(&ciphertext);
                out
            }
            None => plaintext.to_vec(),
        };

        let value = URL_SAFE_NO_PAD.encode(value);
        let timestamp = util::now_unix().to_string();
        let tag = self
            .mac(name, timestamp.as_bytes(), value.as_bytes())?
            .finalize()
            .into_bytes();

        let mut raw = Vec::with_capacity(timestamp.len() + value.len() + tag.len() + 2);
        raw.extend_from_slice(timestamp.as_bytes());
        raw.push(b'|');
        raw.extend_from_slice(value.as_bytes());
        raw.push(b'|');
        raw.extend_from_slice(&tag);

        let token = URL_SAFE_NO_PAD.encode(raw);
        if self.max_length != 0 && token.len() > self.max_length {
            return Err(CodecError::TooLong {
                len: token.len(),
                max: self.max_length,
            });
        }
        Ok(token)
    }

    /// Verify and decode a token issued for the cookie `name`.
    pub fn decode_bytes(&self, name: &str, token: &str) -> Result<Vec<u8>, CodecError> {
        if self.max_length != 0 && token.len() > self.max_length {
            return Err(CodecError::TooLong {
                len: token.len(),
                max: self.max_length,
            });
        }

        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| CodecError::Malformed(format!("base64 token: {e}")))?;

        // Timestamp and value never contain '|'; the tag may.
        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (timestamp, value, tag) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(v), Some(m)) => (t, v, m),
            _ => return Err(CodecError::Malformed("missing token segments".into())),
        };

        self.mac(name, timestamp, value)?
            .verify_slice(tag)
            .map_err(|_| CodecError::MacInvalid)?;

        let issued: i64 = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CodecError::Malformed("invalid timestamp".into()))?;
        if self.max_age != 0 && issued < util::now_unix() - self.max_age {
            return Err(CodecError::Expired);
        }

        let value = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| CodecError::Malformed(format!("base64 value: {e}")))?;

        match &self.block_key {
            Some(key) => {
                if value.len() < NONCE_LEN {
                    return Err(CodecError::Decryption(format!(
                        "value shorter than {NONCE_LEN}-byte nonce"
                    )));
                }
                let (nonce, ciphertext) = value.split_at(NONCE_LEN);
                let cipher = Aes256Gcm::new(key.into());
                cipher
                    .decrypt(
                        Nonce::from_slice(nonce),
                        Payload {
                            msg: ciphertext,
                            aad: name.as_bytes(),
                        },
                    )
                    .map_err(|e| CodecError::Decryption(e.to_string()))
            }
            None => Ok(value),
        }
    }
}
