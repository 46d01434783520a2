//! Signed token verification and issuance.
//!
//! Tokens are HS256 JWTs shared with the identity service. Verification runs
//! the signature check exactly once; everything after that (expiry, kind,
//! projection into a [`Principal`]) works on the already-decoded claims.
//!
//! Expiry is checked against the injected [`Clock`] rather than by
//! `jsonwebtoken`, so `now >= exp` is exact and testable.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use medley_kernel::Clock;
use medley_kernel::gateway::{AuthConfig, Principal, TokenKind};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a token was refused. Every variant is answered with `401`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signature does not match")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("expected {expected:?} token, got {actual:?}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("token was not issued by a trusted issuer")]
    WrongIssuer,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Numeric ids from the identity service; strings are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{n}"),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        s.parse().map(UserId::Number).unwrap_or_else(|_| UserId::Text(s.to_string()))
    }
}

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: username or email.
    pub sub: String,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(default)]
    pub roles: Vec<String>,
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    /// Project into the request-scoped identity. Pure; no re-verification.
    ///
    /// `username` falls back to `sub`; `email` falls back to `sub` when the
    /// subject looks like an address.
    pub fn principal(&self) -> Principal {
        let email = self
            .email
            .clone()
            .or_else(|| self.sub.contains('@').then(|| self.sub.clone()))
            .unwrap_or_default();
        Principal {
            user_id: self.user_id.to_string(),
            username: self.username.clone().unwrap_or_else(|| self.sub.clone()),
            email,
            roles: self.roles.iter().cloned().collect::<BTreeSet<_>>(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Verifier
// ─────────────────────────────────────────────────────────────────────────────

/// Stateless verifier holding the pre-built decoding key.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let secret = config.secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            clock,
        }
    }

    /// Verify `token` and require it to be of `expected` kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(classify)?
            .claims;

        if claims.exp <= claims.iat {
            return Err(TokenError::Malformed("exp must be after iat".to_string()));
        }
        if self.clock.now_secs() >= claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }
        Ok(claims)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::BadSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
        ErrorKind::InvalidAlgorithm => {
            TokenError::Malformed("unsupported signing algorithm".to_string())
        }
        ErrorKind::MissingRequiredClaim(claim) => {
            TokenError::Malformed(format!("missing required claim '{claim}'"))
        }
        other => TokenError::Malformed(format!("{other:?}")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Issuer
// ─────────────────────────────────────────────────────────────────────────────

/// Mints tokens with the configured TTLs. The identity service owns
/// issuance in production; this exists for local tooling and tests.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    issuer: Option<String>,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.expose_secret().as_bytes()),
            issuer: config.issuer.clone(),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            clock,
        }
    }

    /// Sign a token for `principal`; `sub` is the username.
    pub fn issue(&self, principal: &Principal, kind: TokenKind) -> Result<String, TokenError> {
        let iat = self.clock.now_secs();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            sub: principal.username.clone(),
            user_id: UserId::from(principal.user_id.as_str()),
            roles: principal.roles.iter().cloned().collect(),
            kind,
            iat,
            exp: iat + ttl,
            email: (!principal.email.is_empty()).then(|| principal.email.clone()),
            username: Some(principal.username.clone()),
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}
