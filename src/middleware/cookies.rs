//! Cookie stages used for first-party frontend requests.
//!
//! - [`EncryptCookies`]: request cookies arrive sealed and are decrypted before
//!   the handler runs; outgoing `Set-Cookie` values are sealed again.
//! - [`CookieQueue`]: handlers queue cookies during the request; the flush
//!   stage writes them to the response.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, Request, header, request::Parts},
    response::Response,
};
use cookie::Cookie;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::middleware::{HttpInterceptor, HttpNext, ResponseFuture};
use crate::services::encrypter::Encrypter;

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_owned())
}

pub struct EncryptCookies {
    encrypter: Arc<dyn Encrypter>,
    except: HashSet<String>,
}

impl std::fmt::Debug for EncryptCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptCookies")
            .field("except", &self.except)
            .finish_non_exhaustive()
    }
}

impl EncryptCookies {
    /// Cookies named in `except` travel in clear text.
    pub fn new<I, S>(encrypter: Arc<dyn Encrypter>, except: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            encrypter,
            except: except.into_iter().map(Into::into).collect(),
        }
    }

    /// Replace the `Cookie` headers with their decrypted form.
    ///
    /// Cookies that fail to decrypt are dropped.
    pub fn decrypt_request<B>(&self, req: &mut Request<B>) {
        let headers = req.headers_mut();
        let raw: Vec<String> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect();
        if raw.is_empty() {
            return;
        }

        let mut pairs = Vec::new();
        for cookie in raw.iter().flat_map(|s| Cookie::split_parse(s.as_str())) {
            let Ok(cookie) = cookie else { continue };
            if self.except.contains(cookie.name()) {
                pairs.push(format!("{}={}", cookie.name(), cookie.value()));
                continue;
            }
            match self.encrypter.decrypt(cookie.value()) {
                Ok(value) => pairs.push(format!("{}={}", cookie.name(), value)),
                Err(_) => debug!(cookie = %cookie.name(), "dropping cookie that failed to decrypt"),
            }
        }

        headers.remove(header::COOKIE);
        if pairs.is_empty() {
            return;
        }
        match HeaderValue::from_str(&pairs.join("; ")) {
            Ok(value) => {
                headers.insert(header::COOKIE, value);
            }
            Err(err) => warn!(error = %err, "decrypted cookies are not a valid header"),
        }
    }

    /// Seal every outgoing `Set-Cookie` value not listed in `except`.
    pub fn encrypt_response(&self, response: &mut Response) {
        let headers = response.headers_mut();
        let outgoing: Vec<HeaderValue> = headers.get_all(header::SET_COOKIE).iter().cloned().collect();
        if outgoing.is_empty() {
            return;
        }

        headers.remove(header::SET_COOKIE);
        for value in outgoing {
            let sealed = value
                .to_str()
                .ok()
                .and_then(|s| Cookie::parse(s.to_owned()).ok())
                .filter(|c| !self.except.contains(c.name()))
                .and_then(|mut c| {
                    c.set_value(self.encrypter.encrypt(c.value()));
                    HeaderValue::from_str(&c.to_string()).ok()
                });
            headers.append(header::SET_COOKIE, sealed.unwrap_or(value));
        }
    }

    pub async fn handle<F>(&self, mut req: Request<Body>, next: F) -> Result<Response, AppError>
    where
        F: FnOnce(Request<Body>) -> ResponseFuture,
    {
        self.decrypt_request(&mut req);
        let mut response = next(req).await?;
        self.encrypt_response(&mut response);
        Ok(response)
    }

    pub fn interceptor(self: &Arc<Self>) -> HttpInterceptor {
        let stage = Arc::clone(self);
        Arc::new(move |req: Request<Body>, next: HttpNext| -> ResponseFuture {
            let stage = Arc::clone(&stage);
            Box::pin(async move { stage.handle(req, next).await })
        })
    }
}

/// Cookies to attach to the response of the current request.
#[derive(Debug, Clone, Default)]
pub struct CookieQueue {
    cookies: Arc<Mutex<Vec<Cookie<'static>>>>,
}

impl CookieQueue {
    pub fn queue(&self, cookie: Cookie<'static>) {
        let mut cookies = self.cookies.lock();
        cookies.retain(|c| c.name() != cookie.name());
        cookies.push(cookie);
    }

    /// Queue an expired cookie so the browser drops it.
    pub fn forget(&self, name: &str) {
        let mut cookie = Cookie::new(name.to_owned(), "");
        cookie.make_removal();
        self.queue(cookie);
    }

    pub fn is_queued(&self, name: &str) -> bool {
        self.cookies.lock().iter().any(|c| c.name() == name)
    }

    fn drain(&self) -> Vec<Cookie<'static>> {
        std::mem::take(&mut *self.cookies.lock())
    }
}

impl<S> FromRequestParts<S> for CookieQueue
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CookieQueue>().cloned().ok_or_else(|| {
            warn!("CookieQueue requested outside the stateful pipeline");
            AppError::Internal
        })
    }
}

/// Pipeline stage: install a [`CookieQueue`] and flush it into the response.
pub fn add_queued_cookies() -> HttpInterceptor {
    Arc::new(|mut req: Request<Body>, next: HttpNext| -> ResponseFuture {
        let queue = CookieQueue::default();
        req.extensions_mut().insert(queue.clone());
        Box::pin(async move {
            let mut response = next(req).await?;
            for cookie in queue.drain() {
                match HeaderValue::from_str(&cookie.to_string()) {
                    Ok(value) => {
                        response.headers_mut().append(header::SET_COOKIE, value);
                    }
                    Err(err) => warn!(cookie = %cookie.name(), error = %err, "skipping queued cookie"),
                }
            }
            Ok(response)
        })
    })
}
