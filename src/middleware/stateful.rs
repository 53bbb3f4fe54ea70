//! Stateful wrapper for first-party frontend requests.
//!
//! A request whose `Referer` (or `Origin`) host is listed in the stateful
//! domains is sent through:
//! 1. a marker stage inserting [`FrontendRequest`],
//! 2. cookie encryption,
//! 3. the queued-cookie flush,
//! 4. CSRF verification.
//!
//! Every other request (bearer-only API clients included) goes straight to
//! the handler.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};
use tracing::debug;

use crate::config::{CookieConfig, StatefulConfig};
use crate::error::AppError;
use crate::middleware::cookies::{EncryptCookies, add_queued_cookies};
use crate::middleware::csrf::VerifyCsrfToken;
use crate::middleware::patterns::PatternSet;
use crate::middleware::{HttpNext, HttpStage, ResponseFuture};
use crate::pipeline::{Pipeline, Stage, StageResolver};
use crate::services::auth::TokenManager;
use crate::services::encrypter::Encrypter;

/// Request extension: the request came from a trusted frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontendRequest;

pub type HttpStageResolver = dyn StageResolver<Request<Body>, ResponseFuture>;

pub struct EnsureFrontendRequestsAreStateful {
    stateful: PatternSet,
    cookies: CookieConfig,
    encrypt_cookies: HttpStage,
    verify_csrf_token: HttpStage,
    resolver: Option<Arc<HttpStageResolver>>,
}

impl std::fmt::Debug for EnsureFrontendRequestsAreStateful {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsureFrontendRequestsAreStateful")
            .field("stateful", &self.stateful)
            .field("cookies", &self.cookies)
            .field("encrypt_cookies", &self.encrypt_cookies)
            .field("verify_csrf_token", &self.verify_csrf_token)
            .finish_non_exhaustive()
    }
}

impl EnsureFrontendRequestsAreStateful {
    /// Cookies written by these stages are always `HttpOnly` and `SameSite=Lax`.
    pub fn new(
        config: &StatefulConfig,
        encrypter: Arc<dyn Encrypter>,
        tokens: Arc<dyn TokenManager>,
    ) -> Self {
        let cookies = config.cookies.secured();

        let csrf = Arc::new(VerifyCsrfToken::new(
            Arc::clone(&encrypter),
            tokens,
            cookies.clone(),
        ));
        let encrypt = Arc::new(EncryptCookies::new(
            encrypter,
            cookies.encrypt_except.iter().cloned(),
        ));

        let stateful = PatternSet::new(
            config
                .domains
                .iter()
                .map(|d| d.trim())
                .filter(|d| !d.is_empty())
                .map(|d| format!("{d}/*")),
        );

        Self {
            stateful,
            cookies,
            encrypt_cookies: Stage::Resolved(encrypt.interceptor()),
            verify_csrf_token: Stage::Resolved(csrf.interceptor()),
            resolver: None,
        }
    }

    /// Replace the CSRF stage. A [`Stage::Named`] entry needs a resolver.
    pub fn verify_csrf_token(mut self, stage: HttpStage) -> Self {
        self.verify_csrf_token = stage;
        self
    }

    /// Replace the cookie encryption stage.
    pub fn encrypt_cookies(mut self, stage: HttpStage) -> Self {
        self.encrypt_cookies = stage;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<HttpStageResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn cookie_config(&self) -> &CookieConfig {
        &self.cookies
    }

    pub fn from_frontend<B>(&self, req: &Request<B>) -> bool {
        let headers = req.headers();
        let candidate = [header::REFERER, header::ORIGIN]
            .into_iter()
            .filter_map(|name| headers.get(name))
            .filter_map(|v| v.to_str().ok())
            .find(|v| !v.is_empty());

        let Some(candidate) = candidate else {
            return false;
        };

        let domain = normalize_origin(candidate);
        let stateful = self.stateful.is_match(&domain);
        debug!(origin = %domain, stateful, "frontend request check");
        stateful
    }

    fn stages(&self) -> Vec<HttpStage> {
        vec![
            Stage::from_fn(|mut req: Request<Body>, next: HttpNext| {
                req.extensions_mut().insert(FrontendRequest);
                next(req)
            }),
            self.encrypt_cookies.clone(),
            Stage::Resolved(add_queued_cookies()),
            self.verify_csrf_token.clone(),
        ]
    }

    /// # Errors
    ///
    /// Whatever a stage fails with, or [`AppError::Pipeline`] when a named
    /// stage cannot be resolved.
    pub async fn handle<F>(&self, req: Request<Body>, next: F) -> Result<Response, AppError>
    where
        F: FnOnce(Request<Body>) -> ResponseFuture + Send + 'static,
    {
        let stages = if self.from_frontend(&req) {
            self.stages()
        } else {
            Vec::new()
        };

        let mut pipeline = Pipeline::send(req).through(stages);
        if let Some(resolver) = &self.resolver {
            pipeline = pipeline.resolve(resolver.as_ref())?;
        }
        pipeline.then(next).await
    }
}

/// `https://host/path` -> `host/path/`.
fn normalize_origin(value: &str) -> String {
    let value = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .unwrap_or(value);
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

pub fn apply<S>(router: Router<S>, stateful: Arc<EnsureFrontendRequestsAreStateful>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(
        stateful,
        ensure_frontend_requests_are_stateful,
    ))
}

pub async fn ensure_frontend_requests_are_stateful(
    State(stateful): State<Arc<EnsureFrontendRequestsAreStateful>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    stateful
        .handle(req, move |req| -> ResponseFuture {
            Box::pin(async move { Ok(next.run(req).await) })
        })
        .await
}
