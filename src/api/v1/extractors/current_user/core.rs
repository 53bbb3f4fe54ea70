use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

use super::types::CurrentUser;

/// The guard middleware must have inserted `CurrentUser` into the extensions.
/// Missing means nobody was authenticated: 401.
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(AppError::unauthenticated)
    }
}
