//! Request authentication guard.
//!
//! Resolution order for every request:
//! 1. configured session guards, in order (only when a guard factory exists);
//! 2. the bearer token carried by the request.
//!
//! Session-guard failures never block the bearer path: they are logged and
//! treated as "no principal from sessions".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::services::auth::bearer::BearerToken;
use crate::services::auth::user::{AccessTokenContext, User};

pub const DEFAULT_SESSION_GUARD: &str = "web";

/// Failure raised by a session guard backend (store down, bad cookie, ...).
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("session guard `{0}` is not configured")]
    NotConfigured(String),
    #[error("session backend error: {0}")]
    Backend(String),
}

/// Resolves the principal for a bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn find_by_bearer_token(&self, token: &str) -> Result<Option<User>, AppError>;
}

/// A session-based guard (cookie session, remember-me, ...).
#[async_trait]
pub trait SessionGuard: Send + Sync {
    async fn user(&self, parts: &Parts) -> Result<Option<User>, GuardError>;
}

/// Looks up session guards by name.
pub trait AuthGuardFactory: Send + Sync {
    fn guard(&self, name: &str) -> Result<Option<Arc<dyn SessionGuard>>, GuardError>;
}

/// Name -> session guard map.
#[derive(Clone, Default)]
pub struct GuardRegistry {
    guards: HashMap<String, Arc<dyn SessionGuard>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guard(mut self, name: impl Into<String>, guard: Arc<dyn SessionGuard>) -> Self {
        self.guards.insert(name.into(), guard);
        self
    }
}

impl AuthGuardFactory for GuardRegistry {
    fn guard(&self, name: &str) -> Result<Option<Arc<dyn SessionGuard>>, GuardError> {
        self.guards
            .get(name)
            .cloned()
            .map(Some)
            .ok_or_else(|| GuardError::NotConfigured(name.to_string()))
    }
}

#[derive(Clone)]
pub struct Guard {
    provider: Arc<dyn TokenProvider>,
    auth: Option<Arc<dyn AuthGuardFactory>>,
    guards: Vec<String>,
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("session_fallback", &self.auth.is_some())
            .field("guards", &self.guards)
            .finish()
    }
}

impl Guard {
    /// `guards` defaults to `["web"]` when empty.
    pub fn new(
        provider: Arc<dyn TokenProvider>,
        auth: Option<Arc<dyn AuthGuardFactory>>,
        guards: Vec<String>,
    ) -> Self {
        let guards = if guards.is_empty() {
            vec![DEFAULT_SESSION_GUARD.to_string()]
        } else {
            guards
        };
        Self {
            provider,
            auth,
            guards,
        }
    }

    pub fn guards(&self) -> &[String] {
        &self.guards
    }

    /// Resolve the principal for the request.
    ///
    /// A missing bearer token is not an error: it yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Propagates whatever the token provider returns.
    pub async fn user(&self, parts: &Parts) -> Result<Option<User>, AppError> {
        if let Some(user) = self.from_session_guards(parts).await {
            return Ok(Some(user));
        }

        let token = match BearerToken::from_parts(parts) {
            Ok(token) => token,
            Err(AppError::MissingToken) => return Ok(None),
            Err(err) => return Err(err),
        };

        self.provider.find_by_bearer_token(token.as_str()).await
    }

    async fn from_session_guards(&self, parts: &Parts) -> Option<User> {
        let auth = self.auth.as_ref()?;

        match self.try_session_guards(auth.as_ref(), parts).await {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, "session guard failed; falling back to bearer token");
                None
            }
        }
    }

    async fn try_session_guards(
        &self,
        auth: &dyn AuthGuardFactory,
        parts: &Parts,
    ) -> Result<Option<User>, GuardError> {
        for name in &self.guards {
            let Some(guard) = auth.guard(name)? else {
                continue;
            };
            let Some(user) = guard.user(parts).await? else {
                continue;
            };

            debug!(guard = %name, "request authenticated by session guard");
            // The first guard yielding a user wins.
            return Ok(Some(if user.supports_tokens() {
                user.with_access_token(AccessTokenContext::Transient)
            } else {
                user
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::user::{SubjectUser, TokenableUser};
    use axum::http::Request;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/me");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[derive(Default)]
    struct RecordingProvider {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TokenProvider for RecordingProvider {
        async fn find_by_bearer_token(&self, token: &str) -> Result<Option<User>, AppError> {
            self.seen.lock().push(token.to_string());
            Ok(Some(User::plain(SubjectUser {
                id: format!("bearer:{token}"),
            })))
        }
    }

    enum Outcome {
        Nobody,
        Tokenable(&'static str),
        Plain(&'static str),
        Fail,
    }

    struct StubSessionGuard {
        outcome: Outcome,
        calls: AtomicUsize,
    }

    impl StubSessionGuard {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionGuard for StubSessionGuard {
        async fn user(&self, _parts: &Parts) -> Result<Option<User>, GuardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Nobody => Ok(None),
                Outcome::Tokenable(id) => Ok(Some(User::tokenable(TokenableUser::new(
                    SubjectUser { id: id.into() },
                )))),
                Outcome::Plain(id) => Ok(Some(User::plain(SubjectUser { id: id.into() }))),
                Outcome::Fail => Err(GuardError::Backend("session store unreachable".into())),
            }
        }
    }

    #[tokio::test]
    async fn no_token_and_no_factory_resolves_to_none() {
        let guard = Guard::new(Arc::new(RecordingProvider::default()), None, Vec::new());
        let user = guard.user(&parts(None)).await.expect("no error");
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn bearer_token_is_handed_to_the_provider_once() {
        let provider = Arc::new(RecordingProvider::default());
        let guard = Guard::new(provider.clone(), None, Vec::new());

        let user = guard
            .user(&parts(Some("Bearer 5f4dcc3b")))
            .await
            .expect("no error")
            .expect("user");

        assert_eq!(user.auth_identifier(), "bearer:5f4dcc3b");
        assert_eq!(*provider.seen.lock(), vec!["5f4dcc3b".to_string()]);
    }

    #[tokio::test]
    async fn default_guard_list_is_web() {
        let web = StubSessionGuard::new(Outcome::Nobody);
        let registry = GuardRegistry::new().with_guard("web", web.clone());
        let guard = Guard::new(
            Arc::new(RecordingProvider::default()),
            Some(Arc::new(registry)),
            Vec::new(),
        );

        assert_eq!(guard.guards(), ["web"]);
        assert!(guard.user(&parts(None)).await.expect("no error").is_none());
        assert_eq!(web.calls(), 1);
    }

    #[tokio::test]
    async fn first_matching_guard_wins_and_later_guards_are_not_called() {
        let http = StubSessionGuard::new(Outcome::Nobody);
        let api = StubSessionGuard::new(Outcome::Tokenable("session-user"));
        let admin = StubSessionGuard::new(Outcome::Plain("admin"));
        let registry = GuardRegistry::new()
            .with_guard("http", http.clone())
            .with_guard("api", api.clone())
            .with_guard("admin", admin.clone());
        let provider = Arc::new(RecordingProvider::default());

        let guard = Guard::new(
            provider.clone(),
            Some(Arc::new(registry)),
            vec!["http".into(), "api".into(), "admin".into()],
        );

        let user = guard
            .user(&parts(Some("Bearer ignored")))
            .await
            .expect("no error")
            .expect("user");

        assert_eq!(user.auth_identifier(), "session-user");
        assert!(user.token().is_some_and(AccessTokenContext::is_transient));
        assert_eq!((http.calls(), api.calls(), admin.calls()), (1, 1, 0));
        assert!(provider.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn plain_session_user_is_returned_unmodified() {
        let registry = GuardRegistry::new().with_guard("web", StubSessionGuard::new(Outcome::Plain("p")));
        let guard = Guard::new(
            Arc::new(RecordingProvider::default()),
            Some(Arc::new(registry)),
            Vec::new(),
        );

        let user = guard.user(&parts(None)).await.expect("no error").expect("user");
        assert!(!user.supports_tokens());
        assert_eq!(user.auth_identifier(), "p");
    }

    #[tokio::test]
    async fn failing_session_guard_falls_back_to_bearer_path() {
        let failing = StubSessionGuard::new(Outcome::Fail);
        let never = StubSessionGuard::new(Outcome::Tokenable("never"));
        let registry = GuardRegistry::new()
            .with_guard("web", failing.clone())
            .with_guard("api", never.clone());
        let guard = Guard::new(
            Arc::new(RecordingProvider::default()),
            Some(Arc::new(registry)),
            vec!["web".into(), "api".into()],
        );

        let user = guard
            .user(&parts(Some("bearer tok")))
            .await
            .expect("no error")
            .expect("user");

        assert_eq!(user.auth_identifier(), "bearer:tok");
        assert_eq!(never.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_guard_name_without_token_is_none() {
        let guard = Guard::new(
            Arc::new(RecordingProvider::default()),
            Some(Arc::new(GuardRegistry::new())),
            vec!["missing".into()],
        );
        assert!(guard.user(&parts(None)).await.expect("no error").is_none());
    }
}
