/*
 * Responsibility
 * - POST /tokens: personal access token for the caller
 * - DELETE /tokens/current: revoke the token this request was authenticated with
 * - POST /tokens/prune: drop revoked / long-expired tokens from the store
 */
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::api::v1::dto::tokens::{CreateTokenRequest, PruneResponse, TokenResponse};
use crate::api::v1::extractors::CurrentUser;
use crate::error::AppError;
use crate::repos::AccessTokenRepository;
use crate::services::auth::AccessTokenContext;
use crate::state::AppState;

pub async fn create_token(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("token name must not be empty".into()));
    }

    // A token never grants more than the one used to create it.
    let denied: Vec<String> = req
        .scopes
        .iter()
        .filter(|scope| !user.token_can(scope))
        .cloned()
        .collect();
    if !denied.is_empty() {
        return Err(AppError::MissingScopes(denied));
    }

    let issued = state
        .factory
        .make(&user.auth_identifier(), &req.name, req.scopes)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token: issued.plain_text_token,
            token_type: "Bearer".to_string(),
            jti: issued.access_token.jti,
            scopes: issued.access_token.scopes,
            expires_at: issued.access_token.expires_at,
        }),
    ))
}

pub async fn revoke_current_token(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<StatusCode, AppError> {
    let Some(AccessTokenContext::Bearer(token)) = user.token() else {
        return Err(AppError::BadRequest(
            "only bearer tokens can be revoked".into(),
        ));
    };
    let Some(repository) = &state.repository else {
        return Err(AppError::BadRequest(
            "tokens are not persisted and cannot be revoked".into(),
        ));
    };

    let revoked = repository.revoke(&token.jti).await?;
    tracing::info!(
        user = %user.auth_identifier(),
        jti = %token.jti,
        revoked,
        "access token revoked"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn prune_tokens(State(state): State<AppState>) -> Result<Json<PruneResponse>, AppError> {
    let pruned = match &state.repository {
        Some(repository) => repository.prune().await?,
        None => 0,
    };
    tracing::info!(pruned, "token store pruned");
    Ok(Json(PruneResponse { pruned }))
}
