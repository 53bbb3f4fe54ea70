//! Bearer credential extraction.
//!
//! Looks at the `Authorization` header first (`Bearer <value>`, scheme matched
//! case-insensitively). Without a bearer header the `token` field of the request
//! input (form/JSON body or query string) is used instead.

use std::fmt;

use axum::http::{Extensions, HeaderMap, HeaderName, Request, Uri, header, request::Parts};

use crate::error::AppError;
use crate::middleware::input::RequestInput;

/// Immutable bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract with the default header, scheme and field names.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MissingToken`] when neither source carries a value.
    pub fn from_parts(parts: &Parts) -> Result<Self, AppError> {
        BearerExtractor::default().extract(&parts.headers, &parts.uri, &parts.extensions)
    }

    /// Same as [`BearerToken::from_parts`] for a full request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MissingToken`] when neither source carries a value.
    pub fn from_request<B>(req: &Request<B>) -> Result<Self, AppError> {
        BearerExtractor::default().extract(req.headers(), req.uri(), req.extensions())
    }
}

impl fmt::Display for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Credentials stay out of logs.
impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

impl AsRef<str> for BearerToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<BearerToken> for String {
    fn from(token: BearerToken) -> Self {
        token.0
    }
}

/// Where to look for the credential.
#[derive(Debug, Clone)]
pub struct BearerExtractor {
    header: HeaderName,
    scheme: String,
    field: String,
}

impl Default for BearerExtractor {
    fn default() -> Self {
        Self {
            header: header::AUTHORIZATION,
            scheme: "bearer".to_string(),
            field: "token".to_string(),
        }
    }
}

impl BearerExtractor {
    pub fn new(header: HeaderName, scheme: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            header,
            scheme: scheme.into().to_ascii_lowercase(),
            field: field.into(),
        }
    }

    /// # Errors
    ///
    /// Returns [`AppError::MissingToken`] when neither source carries a value.
    pub fn extract(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
        extensions: &Extensions,
    ) -> Result<BearerToken, AppError> {
        let from_header = headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| self.strip_scheme(v));

        let value = match from_header {
            Some(v) => Some(v),
            None => self.from_input(uri, extensions),
        };

        value
            .filter(|v| !v.is_empty())
            .map(BearerToken)
            .ok_or(AppError::MissingToken)
    }

    fn strip_scheme(&self, value: &str) -> Option<String> {
        let value = value.trim_start();
        let prefix = value.get(..self.scheme.len())?;
        if !prefix.eq_ignore_ascii_case(&self.scheme) {
            return None;
        }
        Some(value[self.scheme.len()..].trim().to_string())
    }

    fn from_input(&self, uri: &Uri, extensions: &Extensions) -> Option<String> {
        match extensions.get::<RequestInput>() {
            Some(input) => input.get(&self.field).map(str::to_owned),
            // No buffered input: the query string is still available.
            None => RequestInput::from_query(uri).get(&self.field).map(str::to_owned),
        }
    }
}
