/*
 * Responsibility
 * - v1 URL structure
 * - /health is public; everything else runs behind input bag -> stateful wrapper -> guard
 * - scope requirements are route layers on the individual routes
 */
use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::api::v1::handlers::{
    csrf_cookie::csrf_cookie,
    health::health,
    me::me,
    tokens::{create_token, prune_tokens, revoke_current_token},
};
use crate::middleware::{auth, input::request_input, stateful};
use crate::state::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let issue = auth::scopes::apply(
        Router::new().route("/tokens", post(create_token)),
        ["tokens:write"],
    );
    let prune = auth::scopes::apply(
        Router::new().route("/tokens/prune", post(prune_tokens)),
        ["tokens:admin"],
    );

    let protected = Router::new()
        .route("/csrf-cookie", get(csrf_cookie))
        .route("/me", get(me))
        .route("/tokens/current", delete(revoke_current_token))
        .merge(issue)
        .merge(prune);
    // Last applied runs first.
    let protected = auth::guard::apply(protected, state.guard.clone());
    let protected = stateful::apply(protected, state.stateful.clone());
    let protected = protected.layer(axum_middleware::from_fn(request_input));

    Router::new().route("/health", get(health)).merge(protected)
}
