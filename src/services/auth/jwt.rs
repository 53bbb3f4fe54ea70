use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::{AccessToken, NewAccessToken, TokenClaims, TokenError, TokenManager};

// 32 bytes -> 43 chars base64url.
const CSRF_TOKEN_BYTES: usize = 32;

/// Signing material.
pub enum SigningKeys {
    /// Ed25519 key pair in PEM form.
    EdPem { private_pem: String, public_pem: String },
    /// Shared secret for HS256.
    Hmac(Vec<u8>),
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    jti: String,
    iat: i64,
    exp: i64,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    csrf: Option<String>,
}

/// JWT-backed [`TokenManager`].
///
/// Each issued token carries a random CSRF value (`csrf` claim) used by the
/// double-submit check for first-party frontends.
pub struct JwtTokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    header: Header,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for JwtTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("JwtTokenManager")
            .field("algorithm", &self.header.alg)
            .field("issuer", &self.issuer)
            .field("ttl_minutes", &self.ttl.num_minutes())
            .finish()
    }
}

impl JwtTokenManager {
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidKey`] when the PEM material cannot be parsed
    /// or the HMAC secret is empty.
    pub fn new(keys: SigningKeys, issuer: impl Into<String>, ttl: Duration) -> Result<Self, TokenError> {
        let (algorithm, encoding_key, decoding_key) = match keys {
            SigningKeys::EdPem {
                private_pem,
                public_pem,
            } => {
                let encoding = EncodingKey::from_ed_pem(private_pem.as_bytes())
                    .map_err(|e| TokenError::InvalidKey(format!("invalid ed25519 private key pem: {e}")))?;
                let decoding = DecodingKey::from_ed_pem(public_pem.as_bytes())
                    .map_err(|e| TokenError::InvalidKey(format!("invalid ed25519 public key pem: {e}")))?;
                (Algorithm::EdDSA, encoding, decoding)
            }
            SigningKeys::Hmac(secret) => {
                if secret.is_empty() {
                    return Err(TokenError::InvalidKey("empty hmac secret".into()));
                }
                (
                    Algorithm::HS256,
                    EncodingKey::from_secret(&secret),
                    DecodingKey::from_secret(&secret),
                )
            }
        };

        let issuer = issuer.into();
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = 0;

        Ok(Self {
            encoding_key,
            decoding_key,
            header: Header::new(algorithm),
            validation,
            issuer,
            ttl,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TokenError::Jwt(ErrorKind::InvalidToken.into()))
}

fn generate_csrf_token() -> Result<String, TokenError> {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|_| TokenError::Random)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

impl TokenManager for JwtTokenManager {
    fn decode_token(&self, token: &str) -> Result<AccessToken, TokenError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Jwt(e),
            })?;
        let claims = data.claims;

        Ok(AccessToken {
            jti: claims.jti,
            sub: claims.sub,
            scopes: claims.scopes,
            issuer: claims.iss,
            issued_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
            revoked: false,
            last_used_at: None,
            csrf: claims.csrf,
        })
    }

    fn create_token(&self, claims: TokenClaims) -> Result<NewAccessToken, TokenError> {
        // Whole seconds so the decoded record matches the issued one.
        let issued_at = timestamp(Utc::now().timestamp())?;
        let expires_at = issued_at + self.ttl;

        let access_token = AccessToken {
            jti: Uuid::new_v4().simple().to_string(),
            sub: Some(claims.sub).filter(|s| !s.is_empty()),
            scopes: claims.scopes,
            issuer: self.issuer.clone(),
            issued_at,
            expires_at,
            revoked: false,
            last_used_at: None,
            csrf: Some(generate_csrf_token()?),
        };

        let jwt = JwtClaims {
            iss: access_token.issuer.clone(),
            sub: access_token.sub.clone(),
            jti: access_token.jti.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            scopes: access_token.scopes.clone(),
            csrf: access_token.csrf.clone(),
        };
        let plain_text_token = jsonwebtoken::encode(&self.header, &jwt, &self.encoding_key)?;

        Ok(NewAccessToken {
            access_token,
            plain_text_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(ttl_minutes: i64) -> JwtTokenManager {
        JwtTokenManager::new(
            SigningKeys::Hmac(b"0123456789abcdef0123456789abcdef".to_vec()),
            "http://127.0.0.1",
            Duration::minutes(ttl_minutes),
        )
        .expect("manager")
    }

    fn claims() -> TokenClaims {
        TokenClaims {
            sub: "7b0c1f6e-3a52-4c36-9b43-3f1f0f4d1a2b".into(),
            scopes: vec!["tokens:write".into()],
        }
    }

    #[test]
    fn issued_token_decodes_to_the_same_record() {
        let m = manager(60);
        let issued = m.create_token(claims()).expect("issued");

        let decoded = m.decode_token(&issued.plain_text_token).expect("decoded");

        assert_eq!(decoded, issued.access_token);
        assert_eq!(decoded.jti.len(), 32);
        assert_eq!(decoded.csrf_token().map(str::len), Some(43));
        assert_eq!(decoded.expires_at - decoded.issued_at, Duration::minutes(60));
    }

    #[test]
    fn each_token_gets_its_own_csrf_value() {
        let m = manager(60);
        let a = m.create_token(claims()).expect("a");
        let b = m.create_token(claims()).expect("b");
        assert_ne!(a.access_token.csrf, b.access_token.csrf);
        assert_ne!(a.access_token.jti, b.access_token.jti);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let m = manager(-5);
        let issued = m.create_token(claims()).expect("issued");
        assert!(matches!(
            m.decode_token(&issued.plain_text_token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn foreign_issuer_or_key_is_rejected() {
        let issued = manager(60).create_token(claims()).expect("issued");

        let other_issuer = JwtTokenManager::new(
            SigningKeys::Hmac(b"0123456789abcdef0123456789abcdef".to_vec()),
            "https://elsewhere.example",
            Duration::minutes(60),
        )
        .expect("manager");
        assert!(matches!(
            other_issuer.decode_token(&issued.plain_text_token),
            Err(TokenError::Jwt(_))
        ));

        let other_key = JwtTokenManager::new(
            SigningKeys::Hmac(b"fedcba9876543210fedcba9876543210".to_vec()),
            "http://127.0.0.1",
            Duration::minutes(60),
        )
        .expect("manager");
        assert!(other_key.decode_token(&issued.plain_text_token).is_err());
    }

    #[test]
    fn empty_secret_is_invalid() {
        let err = JwtTokenManager::new(SigningKeys::Hmac(Vec::new()), "iss", Duration::minutes(1))
            .expect_err("empty secret");
        assert!(matches!(err, TokenError::InvalidKey(_)));
    }

    #[test]
    fn garbage_pem_is_invalid() {
        let err = JwtTokenManager::new(
            SigningKeys::EdPem {
                private_pem: "not a pem".into(),
                public_pem: "not a pem".into(),
            },
            "iss",
            Duration::minutes(1),
        )
        .expect_err("bad pem");
        assert!(matches!(err, TokenError::InvalidKey(_)));
    }
}
