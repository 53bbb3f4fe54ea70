use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for `POST /tokens`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTokenRequest {
    /// Label for the token (logged, not embedded in the token).
    pub name: String,

    /// Requested scopes. Each must be granted by the caller's own token.
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    pub jti: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneResponse {
    pub pruned: u64,
}
