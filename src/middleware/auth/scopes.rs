//! Scope gate: the caller's token must grant at least one of the listed scopes.
//!
//! Runs after the guard middleware. Session-authenticated principals carry a
//! transient token, which grants every scope.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};
use tracing::warn;

use crate::api::v1::extractors::CurrentUser;
use crate::error::AppError;
use crate::services::auth::User;

/// Gate the routes of `router` (route layer, so unknown paths still 404).
pub fn apply<S, I, T>(router: Router<S>, scopes: I) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let scopes: Arc<[String]> = scopes.into_iter().map(Into::into).collect();
    router.route_layer(middleware::from_fn_with_state(scopes, check_for_any_scope))
}

pub async fn check_for_any_scope(
    State(scopes): State<Arc<[String]>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = req.extensions().get::<CurrentUser>().map(|u| u.0.as_ref());
    authorize_any(user, &scopes)?;
    Ok(next.run(req).await)
}

/// # Errors
///
/// - `Unauthenticated` when there is no principal or it carries no token
/// - `MissingScopes` (listing `scopes`) when none of them is granted
pub fn authorize_any(user: Option<&User>, scopes: &[String]) -> Result<(), AppError> {
    let Some(user) = user.filter(|u| u.token().is_some()) else {
        return Err(AppError::unauthenticated());
    };

    if scopes.iter().any(|scope| user.token_can(scope)) {
        return Ok(());
    }

    warn!(
        user = %user.auth_identifier(),
        required = ?scopes,
        "token lacks every required scope"
    );
    Err(AppError::MissingScopes(scopes.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::provider::tests::access_token;
    use crate::services::auth::user::{SubjectUser, TokenableUser};
    use crate::services::auth::AccessTokenContext;

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn bearer_user(granted: &[&str]) -> User {
        User::tokenable(TokenableUser::new(SubjectUser { id: "alice".into() }))
            .with_access_token(AccessTokenContext::Bearer(access_token("t", Some("alice"), granted)))
    }

    #[test]
    fn no_principal_or_no_token_is_unauthenticated() {
        let required = scopes(&["tokens:write"]);
        assert!(matches!(
            authorize_any(None, &required),
            Err(AppError::Unauthenticated(_))
        ));

        let tokenless = User::plain(SubjectUser { id: "bob".into() });
        assert!(matches!(
            authorize_any(Some(&tokenless), &required),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn any_granted_scope_passes() {
        let user = bearer_user(&["tokens:read", "tokens:write"]);
        assert!(authorize_any(Some(&user), &scopes(&["tokens:admin", "tokens:write"])).is_ok());
    }

    #[test]
    fn missing_scopes_are_listed() {
        let user = bearer_user(&["tokens:read"]);
        let err = authorize_any(Some(&user), &scopes(&["tokens:admin", "tokens:write"]))
            .expect_err("denied");
        assert_eq!(err.abilities(), ["tokens:admin", "tokens:write"]);
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn transient_token_grants_everything() {
        let user = User::tokenable(TokenableUser::new(SubjectUser { id: "s".into() }))
            .with_access_token(AccessTokenContext::Transient);
        assert!(authorize_any(Some(&user), &scopes(&["tokens:admin"])).is_ok());
    }
}
