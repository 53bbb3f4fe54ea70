//! Authenticated principal types.
//!
//! Session guards and token providers both hand back a [`User`]. Whether the
//! principal can carry an access-token context is an explicit capability
//! ([`HasApiTokens`]); principals lacking it natively can be wrapped in
//! [`TokenableUser`].

use std::fmt;

use super::token::AccessToken;

/// Access token context attached to a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTokenContext {
    /// Authenticated through a session guard, not through a real token.
    Transient,
    /// Authenticated with a decoded bearer token.
    Bearer(AccessToken),
}

impl AccessTokenContext {
    /// A transient context grants every ability; a bearer one only its scopes.
    pub fn can(&self, ability: &str) -> bool {
        match self {
            Self::Transient => true,
            Self::Bearer(token) => token.can(ability),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

pub trait Authenticatable: fmt::Debug + Send + Sync {
    fn auth_identifier(&self) -> String;
}

/// Capability: the principal accepts an access-token context.
pub trait HasApiTokens: Authenticatable {
    fn token(&self) -> Option<&AccessTokenContext>;

    fn with_access_token(&mut self, token: AccessTokenContext);

    fn token_can(&self, ability: &str) -> bool {
        self.token().is_some_and(|t| t.can(ability))
    }
}

/// Adapter giving any [`Authenticatable`] the [`HasApiTokens`] capability.
#[derive(Debug, Clone)]
pub struct TokenableUser<U> {
    inner: U,
    token: Option<AccessTokenContext>,
}

impl<U> TokenableUser<U> {
    pub fn new(inner: U) -> Self {
        Self { inner, token: None }
    }

    pub fn inner(&self) -> &U {
        &self.inner
    }
}

impl<U: Authenticatable> Authenticatable for TokenableUser<U> {
    fn auth_identifier(&self) -> String {
        self.inner.auth_identifier()
    }
}

impl<U: Authenticatable> HasApiTokens for TokenableUser<U> {
    fn token(&self) -> Option<&AccessTokenContext> {
        self.token.as_ref()
    }

    fn with_access_token(&mut self, token: AccessTokenContext) {
        self.token = Some(token);
    }
}

/// The principal resolved for a request.
#[derive(Debug)]
pub enum User {
    Tokenable(Box<dyn HasApiTokens>),
    Plain(Box<dyn Authenticatable>),
}

impl User {
    pub fn tokenable(user: impl HasApiTokens + 'static) -> Self {
        Self::Tokenable(Box::new(user))
    }

    pub fn plain(user: impl Authenticatable + 'static) -> Self {
        Self::Plain(Box::new(user))
    }

    pub fn auth_identifier(&self) -> String {
        match self {
            Self::Tokenable(u) => u.auth_identifier(),
            Self::Plain(u) => u.auth_identifier(),
        }
    }

    pub fn supports_tokens(&self) -> bool {
        matches!(self, Self::Tokenable(_))
    }

    pub fn token(&self) -> Option<&AccessTokenContext> {
        match self {
            Self::Tokenable(u) => u.token(),
            Self::Plain(_) => None,
        }
    }

    /// Attach a context when the principal supports it; plain principals are
    /// returned unchanged.
    pub fn with_access_token(mut self, token: AccessTokenContext) -> Self {
        if let Self::Tokenable(u) = &mut self {
            u.with_access_token(token);
        }
        self
    }

    pub fn token_can(&self, ability: &str) -> bool {
        match self {
            Self::Tokenable(u) => u.token_can(ability),
            Self::Plain(_) => false,
        }
    }
}

/// Minimal principal identified by the token subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectUser {
    pub id: String,
}

impl Authenticatable for SubjectUser {
    fn auth_identifier(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str) -> SubjectUser {
        SubjectUser { id: id.into() }
    }

    #[test]
    fn transient_context_is_attached_to_tokenable_users() {
        let user = User::tokenable(TokenableUser::new(subject("u-1")))
            .with_access_token(AccessTokenContext::Transient);

        assert!(user.token().is_some_and(AccessTokenContext::is_transient));
        assert!(user.token_can("anything"));
    }

    #[test]
    fn plain_users_never_carry_a_token() {
        let user = User::plain(subject("u-2")).with_access_token(AccessTokenContext::Transient);

        assert!(!user.supports_tokens());
        assert!(user.token().is_none());
        assert!(!user.token_can("anything"));
        assert_eq!(user.auth_identifier(), "u-2");
    }
}
