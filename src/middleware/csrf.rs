//! Double-submit CSRF verification for token-authenticated frontends.
//!
//! The expected value is the `csrf` claim of the request's bearer token (or,
//! for tokens without one, the session CSRF token). A state-changing request
//! passes when it submits the same value through `_token`, `X-CSRF-TOKEN`,
//! an encrypted `X-XSRF-TOKEN` header or the `XSRF-TOKEN` cookie.
//!
//! Every passing response gets a fresh `XSRF-TOKEN` cookie so SPAs can echo it.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, header},
    middleware::{self, Next},
    response::Response,
};
use cookie::{
    Cookie,
    time::{Duration, OffsetDateTime},
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::CookieConfig;
use crate::error::AppError;
use crate::middleware::cookies::request_cookie;
use crate::middleware::input::RequestInput;
use crate::middleware::patterns::PatternSet;
use crate::middleware::{HttpInterceptor, HttpNext, ResponseFuture};
use crate::services::auth::{BearerToken, TokenManager};
use crate::services::encrypter::Encrypter;

pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
const TOKEN_FIELD: &str = "_token";
const CSRF_HEADER: &str = "x-csrf-token";
const XSRF_HEADER: &str = "x-xsrf-token";

/// CSRF token of the current session, for tokens issued without a `csrf` claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCsrfToken(pub String);

#[derive(Clone)]
pub struct VerifyCsrfToken {
    encrypter: Arc<dyn Encrypter>,
    tokens: Arc<dyn TokenManager>,
    cookies: CookieConfig,
    except: PatternSet,
}

impl std::fmt::Debug for VerifyCsrfToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyCsrfToken")
            .field("cookies", &self.cookies)
            .field("except", &self.except)
            .finish_non_exhaustive()
    }
}

impl VerifyCsrfToken {
    pub fn new(
        encrypter: Arc<dyn Encrypter>,
        tokens: Arc<dyn TokenManager>,
        cookies: CookieConfig,
    ) -> Self {
        Self {
            encrypter,
            tokens,
            cookies,
            except: PatternSet::default(),
        }
    }

    /// Paths exempt from verification. Surrounding slashes are ignored, `/`
    /// only matches the root and `*` globs are allowed.
    pub fn except<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except = PatternSet::new(paths.into_iter().map(|p| normalize_path(&p.into())));
        self
    }

    pub fn cookie_config(&self) -> &CookieConfig {
        &self.cookies
    }

    /// Check `req`. On success returns the value to refresh the cookie with.
    ///
    /// # Errors
    ///
    /// - [`AppError::MissingToken`] / [`AppError::Token`] when no decodable bearer token is present
    /// - [`AppError::Decrypt`] when `X-XSRF-TOKEN` has to be read and is not a valid payload
    /// - [`AppError::CsrfTokenMismatch`] otherwise
    pub fn verify<B>(&self, req: &Request<B>) -> Result<Option<String>, AppError> {
        let bearer = BearerToken::from_request(req)?;
        let access_token = self.tokens.decode_token(bearer.as_str())?;

        let expected = match access_token.csrf_token() {
            Some(token) => Some(token.to_owned()),
            None => req
                .extensions()
                .get::<SessionCsrfToken>()
                .map(|t| t.0.clone()),
        };

        if is_reading(req.method()) || self.in_except_array(req.uri().path()) {
            return Ok(expected);
        }

        if self.tokens_match(req, expected.as_deref())? {
            return Ok(expected);
        }

        warn!(
            method = %req.method(),
            path = %req.uri().path(),
            "csrf token mismatch"
        );
        Err(AppError::CsrfTokenMismatch)
    }

    /// Verify, run `next`, then attach the `XSRF-TOKEN` cookie.
    pub async fn handle<F>(&self, req: Request<Body>, next: F) -> Result<Response, AppError>
    where
        F: FnOnce(Request<Body>) -> ResponseFuture,
    {
        let expected = self.verify(&req)?;
        let mut response = next(req).await?;
        if let Some(token) = expected {
            self.add_cookie_to_response(&mut response, &token);
        }
        Ok(response)
    }

    /// This verifier as a pipeline stage.
    pub fn interceptor(self: &Arc<Self>) -> HttpInterceptor {
        let csrf = Arc::clone(self);
        Arc::new(move |req: Request<Body>, next: HttpNext| -> ResponseFuture {
            let csrf = Arc::clone(&csrf);
            Box::pin(async move { csrf.handle(req, next).await })
        })
    }

    fn in_except_array(&self, path: &str) -> bool {
        !self.except.is_empty() && self.except.is_match(&normalize_path(path))
    }

    fn tokens_match<B>(&self, req: &Request<B>, expected: Option<&str>) -> Result<bool, AppError> {
        let Some(expected) = expected else {
            return Ok(false);
        };
        let Some(submitted) = self.token_from_request(req)? else {
            debug!("no csrf token submitted");
            return Ok(false);
        };
        Ok(expected.as_bytes().ct_eq(submitted.as_bytes()).into())
    }

    fn token_from_request<B>(&self, req: &Request<B>) -> Result<Option<String>, AppError> {
        let input = match req.extensions().get::<RequestInput>() {
            Some(input) => input.get(TOKEN_FIELD).map(str::to_owned),
            None => RequestInput::from_query(req.uri())
                .get(TOKEN_FIELD)
                .map(str::to_owned),
        };
        if let Some(token) = input.filter(|t| !t.is_empty()) {
            return Ok(Some(token));
        }

        let headers = req.headers();
        if let Some(token) = header_str(headers, CSRF_HEADER) {
            return Ok(Some(token.to_owned()));
        }

        if let Some(sealed) = header_str(headers, XSRF_HEADER) {
            return Ok(Some(self.encrypter.decrypt(sealed)?));
        }

        Ok(request_cookie(headers, XSRF_COOKIE))
    }

    fn add_cookie_to_response(&self, response: &mut Response, token: &str) {
        let config = &self.cookies;
        let mut builder = Cookie::build((XSRF_COOKIE, token.to_owned()))
            .path(config.path.clone())
            .secure(config.secure)
            .http_only(config.http_only)
            .same_site(config.same_site);
        match OffsetDateTime::now_utc().checked_add(Duration::seconds(config.lifetime.saturating_mul(60))) {
            Some(expires) => builder = builder.expires(expires),
            None => warn!(lifetime = config.lifetime, "cookie lifetime out of range; sending a session cookie"),
        }
        if let Some(domain) = &config.domain {
            builder = builder.domain(domain.clone());
        }

        match HeaderValue::from_str(&builder.build().to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => warn!(error = %err, "could not encode XSRF-TOKEN cookie"),
        }
    }
}

fn is_reading(method: &Method) -> bool {
    matches!(*method, Method::HEAD | Method::GET | Method::OPTIONS)
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn header_str<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Apply CSRF verification to every route of `router`.
pub fn apply<S>(router: Router<S>, csrf: Arc<VerifyCsrfToken>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(csrf, verify_csrf_token))
}

pub async fn verify_csrf_token(
    State(csrf): State<Arc<VerifyCsrfToken>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    csrf.handle(req, move |req| -> ResponseFuture {
        Box::pin(async move { Ok(next.run(req).await) })
    })
    .await
}
