//! Resolve the request principal through [`Guard`] and store it as [`CurrentUser`].
//!
//! No principal is not an error here: handlers that need one take the
//! `CurrentUser` extractor, which rejects with 401.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::api::v1::extractors::CurrentUser;
use crate::error::AppError;
use crate::services::auth::Guard;

/// Authenticate every request routed through `router`.
///
/// ```ignore
/// let v1 = api::v1::routes();
/// let v1 = middleware::auth::guard::apply(v1, guard.clone());
/// app = app.nest("/api/v1", v1);
/// ```
pub fn apply<S>(router: Router<S>, guard: Arc<Guard>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(guard, authenticate))
}

async fn authenticate(
    State(guard): State<Arc<Guard>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();

    match guard.user(&parts).await? {
        Some(user) => {
            tracing::debug!(user = %user.auth_identifier(), "request authenticated");
            parts.extensions.insert(CurrentUser(Arc::new(user)));
        }
        None => tracing::debug!("no principal for request"),
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}
