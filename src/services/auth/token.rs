use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while issuing or decoding access tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("token has expired")]
    Expired,
    #[error("token has been revoked")]
    Revoked,
    #[error("random source unavailable")]
    Random,
}

/// Decoded (or freshly issued) access token.
///
/// `csrf` is the double-submit value bound to the token when it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub jti: String,
    pub sub: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub csrf: Option<String>,
}

impl AccessToken {
    /// `*` grants every ability.
    pub fn can(&self, ability: &str) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == ability)
    }

    pub fn cant(&self, ability: &str) -> bool {
        !self.can(ability)
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf.as_deref()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn mark_as_revoked(&mut self) {
        self.revoked = true;
    }
}

/// Claims requested when issuing a token.
#[derive(Debug, Clone, Default)]
pub struct TokenClaims {
    pub sub: String,
    pub scopes: Vec<String>,
}

/// Result of issuance: the token record plus the plain text handed to the client.
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub access_token: AccessToken,
    pub plain_text_token: String,
}

/// Token encoding/decoding capability.
pub trait TokenManager: Send + Sync {
    /// # Errors
    ///
    /// Fails when the signature, issuer or expiry check fails.
    fn decode_token(&self, token: &str) -> Result<AccessToken, TokenError>;

    /// # Errors
    ///
    /// Fails when signing fails or no randomness is available.
    fn create_token(&self, claims: TokenClaims) -> Result<NewAccessToken, TokenError>;
}
