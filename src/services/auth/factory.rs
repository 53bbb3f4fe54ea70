/// Factory: issue personal access tokens and record them in the token store.
use std::sync::Arc;

use tracing::info;

use crate::error::AppError;
use crate::repos::AccessTokenRepository;
use crate::services::auth::token::{NewAccessToken, TokenClaims, TokenManager};

#[derive(Clone)]
pub struct PersonalAccessTokenFactory {
    tokens: Arc<dyn TokenManager>,
    repository: Option<Arc<dyn AccessTokenRepository>>,
}

impl PersonalAccessTokenFactory {
    pub fn new(
        tokens: Arc<dyn TokenManager>,
        repository: Option<Arc<dyn AccessTokenRepository>>,
    ) -> Self {
        Self { tokens, repository }
    }

    /// `name` only labels the issuance in logs.
    ///
    /// # Errors
    ///
    /// Fails when signing fails or the token store rejects the record.
    pub async fn make(
        &self,
        subject: &str,
        name: &str,
        scopes: Vec<String>,
    ) -> Result<NewAccessToken, AppError> {
        let token = self.tokens.create_token(TokenClaims {
            sub: subject.to_string(),
            scopes,
        })?;

        if let Some(repository) = &self.repository {
            repository.persist(&token.access_token).await?;
        }

        info!(
            token_name = %name,
            jti = %token.access_token.jti,
            persisted = self.repository.is_some(),
            "personal access token issued"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::provider::tests::{FakeTokens, MemoryRepository};

    #[tokio::test]
    async fn issued_token_is_persisted_when_a_store_exists() {
        let repo = Arc::new(MemoryRepository::default());
        let factory = PersonalAccessTokenFactory::new(
            Arc::new(FakeTokens::with(Vec::new())),
            Some(repo.clone()),
        );

        let issued = factory
            .make("alice", "cli", vec!["tokens:write".into()])
            .await
            .expect("issued");

        let stored = repo.get(&issued.access_token.jti).await.expect("get").expect("row");
        assert_eq!(stored.sub.as_deref(), Some("alice"));
        assert_eq!(stored.scopes, ["tokens:write"]);
    }

    #[tokio::test]
    async fn without_a_store_the_token_is_only_issued() {
        let factory = PersonalAccessTokenFactory::new(Arc::new(FakeTokens::with(Vec::new())), None);
        let issued = factory.make("bob", "cli", Vec::new()).await.expect("issued");
        assert_eq!(issued.plain_text_token, issued.access_token.jti);
    }
}
