//! Authenticated encryption for cookie and header payloads.
//!
//! The CSRF verifier only needs `decrypt` (for the `X-XSRF-TOKEN` header); the
//! cookie-encryption stage needs both directions.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cookie::{Cookie, CookieJar, Key};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("the payload is invalid")]
    InvalidPayload,
}

pub trait Encrypter: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> String;

    /// Decrypt and authenticate `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns [`DecryptError::InvalidPayload`] when the payload was tampered
    /// with or was not produced by this encrypter.
    fn decrypt(&self, ciphertext: &str) -> Result<String, DecryptError>;
}

// Associated data bound into every sealed value.
const SEAL_NAME: &str = "jwt-guard";

/// AES-256-GCM encrypter backed by the `cookie` crate's private jar.
///
/// Key material is not printable via Debug.
#[derive(Clone)]
pub struct KeyEncrypter {
    key: Key,
}

impl std::fmt::Debug for KeyEncrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyEncrypter").finish_non_exhaustive()
    }
}

impl KeyEncrypter {
    /// Build from an application secret.
    ///
    /// Accepts `base64:<...>` (decoded first) or a raw string. The secret is
    /// hashed to a 32-byte master key and expanded into encryption keys.
    pub fn from_secret(secret: &str) -> Self {
        let raw = match secret.strip_prefix("base64:") {
            Some(encoded) => STANDARD
                .decode(encoded.trim())
                .unwrap_or_else(|_| encoded.as_bytes().to_vec()),
            None => secret.as_bytes().to_vec(),
        };
        let master = Sha256::digest(&raw);
        Self {
            key: Key::derive_from(&master),
        }
    }

    /// Fresh random key. Values sealed with it do not survive a restart.
    pub fn generate() -> Self {
        Self { key: Key::generate() }
    }
}

impl Encrypter for KeyEncrypter {
    fn encrypt(&self, plaintext: &str) -> String {
        let mut jar = CookieJar::new();
        jar.private_mut(&self.key)
            .add(Cookie::new(SEAL_NAME, plaintext.to_owned()));
        jar.get(SEAL_NAME)
            .map(|c| c.value().to_owned())
            .unwrap_or_default()
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, DecryptError> {
        let jar = CookieJar::new();
        jar.private(&self.key)
            .decrypt(Cookie::new(SEAL_NAME, ciphertext.to_owned()))
            .map(|c| c.value().to_owned())
            .ok_or(DecryptError::InvalidPayload)
    }
}
