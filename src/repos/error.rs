/*
 * Responsibility
 * - meaning the repo layer reports upward
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("db error")]
    Db(#[from] sqlx::Error),
    #[error("invalid token subject `{0}` (expected UUID)")]
    InvalidSubject(String),
    #[error("stored scopes are not a JSON string array")]
    InvalidScopes(#[from] serde_json::Error),
}
