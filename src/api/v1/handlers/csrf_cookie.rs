/*
 * Responsibility
 * - GET /csrf-cookie: empty 204 a SPA calls to receive its first XSRF-TOKEN cookie
 * - the cookie itself is written by the stateful wrapper's CSRF stage
 */
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

pub async fn csrf_cookie(headers: HeaderMap) -> Response {
    if expects_json(&headers) {
        (
            StatusCode::NO_CONTENT,
            [(header::CONTENT_TYPE, "application/json")],
        )
            .into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

fn expects_json(headers: &HeaderMap) -> bool {
    let ajax = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("/json") || v.contains("+json"));
    ajax || accepts_json
}
