use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::services::auth::token::AccessToken;

/// Storage for issued access tokens, keyed by `jti`.
#[async_trait]
pub trait AccessTokenRepository: Send + Sync {
    async fn persist(&self, token: &AccessToken) -> Result<(), RepoError>;

    async fn get(&self, jti: &str) -> Result<Option<AccessToken>, RepoError>;

    /// Returns the number of rows flagged.
    async fn revoke(&self, jti: &str) -> Result<u64, RepoError>;

    /// Delete revoked tokens (and tokens past the refresh window). Returns the number removed.
    async fn prune(&self) -> Result<u64, RepoError>;
}

/// Postgres-backed repository over the `oauth_tokens` table.
///
/// Notes:
/// - `sub` is stored as UUID (project convention for subjects).
/// - `scopes` is a JSON array serialized into a TEXT column.
#[derive(Clone, Debug)]
pub struct PgAccessTokenRepository {
    pool: PgPool,
    refresh_window: Duration,
}

impl PgAccessTokenRepository {
    /// `refresh_window`: how long an expired token is kept before `prune` removes it.
    pub fn new(pool: PgPool, refresh_window: Duration) -> Self {
        Self {
            pool,
            refresh_window,
        }
    }
}

#[async_trait]
impl AccessTokenRepository for PgAccessTokenRepository {
    async fn persist(&self, token: &AccessToken) -> Result<(), RepoError> {
        let sub = token.sub.as_deref().map(parse_subject).transpose()?;
        let scopes = serde_json::to_string(&token.scopes)?;

        sqlx::query(
            r#"
            INSERT INTO oauth_tokens
                (scopes, sub, issuer, jti, expires_at, issued_at, revoked, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(scopes)
        .bind(sub)
        .bind(&token.issuer)
        .bind(&token.jti)
        .bind(token.expires_at)
        .bind(token.issued_at)
        .bind(token.revoked)
        .bind(token.last_used_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, jti: &str) -> Result<Option<AccessToken>, RepoError> {
        let row = sqlx::query_as::<_, AccessTokenRow>(
            r#"
            SELECT scopes, sub, issuer, jti, expires_at, issued_at, revoked, last_used_at
            FROM oauth_tokens
            WHERE jti = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccessToken::try_from).transpose()
    }

    async fn revoke(&self, jti: &str) -> Result<u64, RepoError> {
        let done = sqlx::query(
            r#"
            UPDATE oauth_tokens
            SET revoked = TRUE,
                updated_at = now()
            WHERE jti = $1
                AND revoked = FALSE
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected())
    }

    async fn prune(&self) -> Result<u64, RepoError> {
        let cutoff = Utc::now() - self.refresh_window;
        let done = sqlx::query(
            r#"
            DELETE FROM oauth_tokens
            WHERE revoked = TRUE
                OR expires_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected())
    }
}

fn parse_subject(sub: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(sub).map_err(|_| RepoError::InvalidSubject(sub.to_string()))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccessTokenRow {
    pub scopes: String,
    pub sub: Option<Uuid>,
    pub issuer: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccessTokenRow> for AccessToken {
    type Error = RepoError;

    fn try_from(row: AccessTokenRow) -> Result<Self, Self::Error> {
        let scopes = if row.scopes.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&row.scopes)?
        };

        Ok(AccessToken {
            jti: row.jti,
            sub: row.sub.map(|s| s.to_string()),
            scopes,
            issuer: row.issuer,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            revoked: row.revoked,
            last_used_at: row.last_used_at,
            // Never persisted.
            csrf: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(scopes: &str) -> AccessTokenRow {
        let now = Utc::now();
        AccessTokenRow {
            scopes: scopes.into(),
            sub: Some(Uuid::nil()),
            issuer: "http://127.0.0.1".into(),
            jti: "abc".into(),
            expires_at: now + Duration::minutes(10),
            issued_at: now,
            revoked: true,
            last_used_at: None,
        }
    }

    #[test]
    fn row_converts_into_access_token() {
        let token = AccessToken::try_from(row(r#"["tokens:write","*"]"#)).expect("token");
        assert_eq!(token.scopes, ["tokens:write", "*"]);
        assert_eq!(token.sub.as_deref(), Some("00000000-0000-0000-0000-000000000000"));
        assert!(token.revoked);
        assert!(token.csrf.is_none());
    }

    #[test]
    fn blank_scopes_column_means_no_scopes() {
        let token = AccessToken::try_from(row("")).expect("token");
        assert!(token.scopes.is_empty());
    }

    #[test]
    fn malformed_scopes_are_reported() {
        assert!(matches!(
            AccessToken::try_from(row("tokens:write")),
            Err(RepoError::InvalidScopes(_))
        ));
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        assert!(matches!(parse_subject("user-1"), Err(RepoError::InvalidSubject(_))));
    }
}
