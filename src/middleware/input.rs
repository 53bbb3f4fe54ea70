//! Request input bag.
//!
//! Handlers and middleware further down (bearer extraction, CSRF `_token`)
//! look up named input fields without consuming the body. This middleware
//! buffers form / JSON bodies once, stores the merged fields as a
//! [`RequestInput`] extension and puts the bytes back for the handler.
//!
//! Body fields override query fields with the same name.

use std::collections::HashMap;

use axum::{
    body::{self, Body},
    http::{Request, Uri, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::AppError;

use crate::middleware::http::BODY_LIMIT_BYTES as MAX_INPUT_BYTES;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInput {
    fields: HashMap<String, String>,
}

impl RequestInput {
    pub fn from_query(uri: &Uri) -> Self {
        let mut input = Self::default();
        if let Some(query) = uri.query() {
            input.extend_form(query.as_bytes());
        }
        input
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    fn extend_form(&mut self, bytes: &[u8]) {
        for (k, v) in url::form_urlencoded::parse(bytes) {
            self.fields.insert(k.into_owned(), v.into_owned());
        }
    }

    // Only top-level scalar members are addressable by name.
    fn extend_json(&mut self, bytes: &[u8]) {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(bytes) else {
            debug!("request body is not a JSON object; ignoring for input lookup");
            return;
        };
        for (k, v) in map {
            let value = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            self.fields.insert(k, value);
        }
    }
}

enum BodyKind {
    Form,
    Json,
    Other,
}

fn body_kind<B>(req: &Request<B>) -> BodyKind {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        BodyKind::Form
    } else if content_type.starts_with("application/json") {
        BodyKind::Json
    } else {
        BodyKind::Other
    }
}

/// Buffer the request input and attach it as an extension.
///
/// # Errors
///
/// Fails with [`AppError::BadRequest`] when the body cannot be read within the limit.
pub async fn buffer_request_input(req: Request<Body>) -> Result<Request<Body>, AppError> {
    let mut input = RequestInput::from_query(req.uri());

    let kind = body_kind(&req);
    let req = match kind {
        BodyKind::Other => req,
        BodyKind::Form | BodyKind::Json => {
            let (parts, body) = req.into_parts();
            let bytes = body::to_bytes(body, MAX_INPUT_BYTES).await.map_err(|err| {
                debug!(error = %err, "failed to buffer request body");
                AppError::BadRequest("request body could not be read".into())
            })?;
            match kind {
                BodyKind::Form => input.extend_form(&bytes),
                _ => input.extend_json(&bytes),
            }
            Request::from_parts(parts, Body::from(bytes))
        }
    };

    let mut req = req;
    req.extensions_mut().insert(input);
    Ok(req)
}

/// axum middleware wrapper around [`buffer_request_input`].
pub async fn request_input(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let req = buffer_request_input(req).await?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn form_body_fields_override_query_fields() {
        let req = Request::builder()
            .method("POST")
            .uri("/submit?token=query&page=2")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("token=body&_token=csrf%20value"))
            .expect("request");

        let req = buffer_request_input(req).await.expect("buffered");
        let input = req.extensions().get::<RequestInput>().expect("input");

        assert_eq!(input.get("token"), Some("body"));
        assert_eq!(input.get("_token"), Some("csrf value"));
        assert_eq!(input.get("page"), Some("2"));

        // the handler still sees the original body
        let bytes = body::to_bytes(req.into_body(), MAX_INPUT_BYTES)
            .await
            .expect("body");
        assert_eq!(&bytes[..], b"token=body&_token=csrf%20value");
    }

    #[tokio::test]
    async fn json_scalars_are_exposed_by_name() {
        let req = Request::builder()
            .method("POST")
            .uri("/submit")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"_token":"abc","count":3,"nested":{"a":1}}"#))
            .expect("request");

        let req = buffer_request_input(req).await.expect("buffered");
        let input = req.extensions().get::<RequestInput>().expect("input");

        assert_eq!(input.get("_token"), Some("abc"));
        assert_eq!(input.get("count"), Some("3"));
        assert_eq!(input.get("nested"), None);
    }

    #[tokio::test]
    async fn other_bodies_are_left_alone() {
        let req = Request::builder()
            .method("POST")
            .uri("/upload?token=q")
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from("token=not-parsed"))
            .expect("request");

        let req = buffer_request_input(req).await.expect("buffered");
        let input = req.extensions().get::<RequestInput>().expect("input");
        assert_eq!(input.get("token"), Some("q"));
    }
}
