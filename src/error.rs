/*
 * Responsibility
 * - crate-wide AppError definition
 * - IntoResponse implementation (HTTP status / JSON error body)
 * - token / decrypt / repo / pipeline errors converted into one type
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::repos::error::RepoError;
use crate::services::auth::TokenError;
use crate::services::encrypter::DecryptError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bearer token not found in request")]
    MissingToken,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Token has missing scopes: {}", .0.join(", "))]
    MissingScopes(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("CSRF token mismatch.")]
    CsrfTokenMismatch,

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("request timed out")]
    Timeout,

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn unauthenticated() -> Self {
        Self::Unauthenticated("UnAuthenticated.".into())
    }

    /// Abilities the caller was missing, for `MissingScopes`.
    pub fn abilities(&self) -> &[String] {
        match self {
            Self::MissingScopes(scopes) => scopes,
            _ => &[],
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingToken | AppError::Unauthenticated(_) | AppError::Token(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::MissingScopes(_) => StatusCode::FORBIDDEN,
            // 419: the status session-based frameworks use for an expired/forged form token
            AppError::CsrfTokenMismatch => {
                StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN)
            }
            AppError::BadRequest(_) | AppError::Decrypt(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Pipeline(_) | AppError::Repo(_) | AppError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::MissingToken => "MISSING_TOKEN",
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::MissingScopes(_) => "MISSING_SCOPES",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::CsrfTokenMismatch => "CSRF_TOKEN_MISMATCH",
            AppError::Decrypt(_) => "INVALID_PAYLOAD",
            AppError::Token(_) => "INVALID_TOKEN",
            AppError::Timeout => "REQUEST_TIMEOUT",
            AppError::Pipeline(_) | AppError::Repo(_) | AppError::Internal => {
                "INTERNAL_SERVER_ERROR"
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Never leak backend details to the client.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_scopes_lists_every_ability() {
        let err = AppError::MissingScopes(vec!["posts:read".into(), "posts:write".into()]);
        assert_eq!(err.to_string(), "Token has missing scopes: posts:read, posts:write");
        assert_eq!(err.abilities(), ["posts:read", "posts:write"]);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn auth_failures_map_to_expected_statuses() {
        assert_eq!(AppError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::unauthenticated().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::CsrfTokenMismatch.status().as_u16(), 419);
    }

    #[test]
    fn server_errors_hide_details() {
        let response = AppError::Internal.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
