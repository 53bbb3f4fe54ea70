//! Bearer token -> principal resolution.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::repos::AccessTokenRepository;
use crate::services::auth::guard::TokenProvider;
use crate::services::auth::token::{TokenError, TokenManager};
use crate::services::auth::user::{AccessTokenContext, SubjectUser, TokenableUser, User};

/// Loads principals by the token subject.
#[async_trait]
pub trait UserProvider: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;
}

/// Treats every subject as a valid principal.
///
/// Used when no user store is wired in: the subject claim is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectUserProvider;

#[async_trait]
impl UserProvider for SubjectUserProvider {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(Some(User::tokenable(TokenableUser::new(SubjectUser {
            id: id.to_string(),
        }))))
    }
}

/// Decodes bearer tokens, checks them against the repository and loads the user.
pub struct BearerTokenProvider {
    tokens: Arc<dyn TokenManager>,
    users: Arc<dyn UserProvider>,
    repository: Option<Arc<dyn AccessTokenRepository>>,
}

impl BearerTokenProvider {
    pub fn new(
        tokens: Arc<dyn TokenManager>,
        users: Arc<dyn UserProvider>,
        repository: Option<Arc<dyn AccessTokenRepository>>,
    ) -> Self {
        Self {
            tokens,
            users,
            repository,
        }
    }
}

#[async_trait]
impl TokenProvider for BearerTokenProvider {
    async fn find_by_bearer_token(&self, token: &str) -> Result<Option<User>, AppError> {
        let access_token = self.tokens.decode_token(token).map_err(|err| {
            warn!(error = %err, "bearer token rejected");
            AppError::Token(err)
        })?;

        if access_token.is_expired_at(Utc::now()) {
            return Err(TokenError::Expired.into());
        }

        if let Some(repository) = &self.repository {
            match repository.get(&access_token.jti).await? {
                None => {
                    warn!(jti = %access_token.jti, "bearer token is unknown to the token store");
                    return Ok(None);
                }
                Some(stored) if stored.revoked => {
                    warn!(jti = %access_token.jti, "bearer token has been revoked");
                    return Err(TokenError::Revoked.into());
                }
                Some(_) => {}
            }
        }

        let Some(subject) = access_token.sub.clone() else {
            debug!(jti = %access_token.jti, "bearer token carries no subject");
            return Ok(None);
        };

        let user = self.users.find_by_id(&subject).await?;
        Ok(user.map(|u| u.with_access_token(AccessTokenContext::Bearer(access_token))))
    }
}
