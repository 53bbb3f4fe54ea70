use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::auth::{AccessTokenContext, User};

#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenInfo {
    /// Authenticated by a session guard.
    Transient,
    Bearer {
        jti: String,
        scopes: Vec<String>,
        expires_at: DateTime<Utc>,
    },
}

impl From<&User> for MeResponse {
    fn from(user: &User) -> Self {
        let token = user.token().map(|ctx| match ctx {
            AccessTokenContext::Transient => TokenInfo::Transient,
            AccessTokenContext::Bearer(token) => TokenInfo::Bearer {
                jti: token.jti.clone(),
                scopes: token.scopes.clone(),
                expires_at: token.expires_at,
            },
        });

        Self {
            id: user.auth_identifier(),
            token,
        }
    }
}
