/*
 * Responsibility
 * - GET /me: the principal the guard resolved, and how
 */
use axum::Json;

use crate::api::v1::dto::me::MeResponse;
use crate::api::v1::extractors::CurrentUser;

pub async fn me(user: CurrentUser) -> Json<MeResponse> {
    Json(MeResponse::from(&*user))
}
