//! Outer HTTP layers: request id, access log span, body limit and timeout.
//!
//! Failures raised here (timeouts, layer errors) are rendered as [`AppError`]
//! so clients see the same `{"error":{...}}` body as from the handlers.

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::{Request, header::HeaderName};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::HttpConfig;
use crate::error::AppError;

/// Shared with the request input buffer so both stop at the same size.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

const REQUEST_ID: &str = "x-request-id";

pub fn apply(router: Router, config: &HttpConfig) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID);

    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
            let id = req
                .headers()
                .get(REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!("request", method = %req.method(), uri = %req.uri(), request_id = %id)
        }))
        .layer(HandleErrorLayer::new(|err: BoxError| async move { layer_error(err) }))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TimeoutLayer::new(config.request_timeout));

    router.layer(layers)
}

fn layer_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!("request timed out");
        AppError::Timeout
    } else {
        warn!(error = %err, "unhandled layer error");
        AppError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(timeout: Duration) -> Router {
        let router = Router::new()
            .route("/fast", get(|| async { "ok" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );
        apply(
            router,
            &HttpConfig {
                request_timeout: timeout,
            },
        )
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let response = app(Duration::from_secs(1))
            .oneshot(Request::builder().uri("/fast").body(Body::empty()).expect("req"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID));

        let response = app(Duration::from_secs(1))
            .oneshot(
                Request::builder()
                    .uri("/fast")
                    .header(REQUEST_ID, "given-id")
                    .body(Body::empty())
                    .expect("req"),
            )
            .await
            .expect("response");
        assert_eq!(
            response.headers().get(REQUEST_ID).map(|v| v.as_bytes()),
            Some(&b"given-id"[..])
        );
    }

    #[tokio::test]
    async fn slow_requests_time_out_with_an_error_body() {
        let response = app(Duration::from_millis(20))
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).expect("req"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"]["code"], "REQUEST_TIMEOUT");
    }
}
