//! Signed session tokens carrying the catalog identity.
//!
//! Tokens are HS256 JWTs. Signature and algorithm are checked by `jsonwebtoken`;
//! expiry is checked here against an injected [`Clock`] so tests are
//! deterministic. Every rejection surfaces as the same [`Error::Unauthorized`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::Catalog;
use crate::error::{Error, Result};

/// Fallback secret used when none is configured. Refused in production.
pub const DEFAULT_JWT_SECRET: &str = "dev-secret";

/// Minimum secret length accepted in production.
pub const MIN_SECRET_LEN: usize = 32;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Upper bounds accepted from configuration.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const MAX_SESSION_LEEWAY: Duration = Duration::from_secs(60 * 60);

pub const COOKIE_NAME: &str = "token";

/// Outer lifetime of the session cookie. The token inside expires much sooner.
pub const COOKIE_LIFETIME_DAYS: i64 = 100;

const ALGORITHM: Algorithm = Algorithm::HS256;

// ── Clock ────────────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ── Secret ───────────────────────────────────────────────────────────

/// HMAC signing secret. Never printed.
#[derive(Clone)]
pub struct SigningSecret(SecretString);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret: String = secret.into();
        if secret.is_empty() {
            return Err(Error::Config("JWT secret must not be empty".to_string()));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    fn expose(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == DEFAULT_JWT_SECRET
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret([REDACTED, {} bytes])", self.len())
    }
}

// ── Claims ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Catalog id, as a string.
    pub sub: String,
    pub catalog_id: i64,
    pub catalog_name: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// The catalog this session acts for, or `None` if the claim carries no
    /// usable id. Callers treat `None` as an authentication failure.
    pub fn catalog_id(&self) -> Option<i64> {
        (self.catalog_id > 0).then_some(self.catalog_id)
    }
}

// ── Authenticator ────────────────────────────────────────────────────

/// Issues and validates session tokens. Cheap to clone and share across threads.
#[derive(Clone)]
pub struct SessionAuthenticator {
    secret: SigningSecret,
    ttl_secs: i64,
    leeway_secs: i64,
    clock: Arc<dyn Clock>,
}

impl SessionAuthenticator {
    pub fn new(secret: SigningSecret) -> Self {
        Self {
            secret,
            ttl_secs: secs(DEFAULT_SESSION_TTL),
            leeway_secs: 0,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = secs(ttl);
        self
    }

    /// Tolerated clock skew when checking expiry.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway_secs = secs(leeway);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sign a token for `catalog`, valid from now for the configured lifetime.
    pub fn issue(&self, catalog: &Catalog) -> Result<String> {
        let now = self.clock.now_epoch_secs();
        let claims = Claims {
            sub: catalog.id.to_string(),
            catalog_id: catalog.id,
            catalog_name: catalog.name.clone(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        let token = encode(
            &Header::new(ALGORITHM),
            &claims,
            &EncodingKey::from_secret(self.secret.expose()),
        )
        .map_err(Error::TokenEncoding)?;
        tracing::debug!(catalog_id = catalog.id, exp = claims.exp, "session issued");
        Ok(token)
    }

    /// Verify algorithm, signature and expiry, returning the claims.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(reason = %e, "session token rejected");
            Error::Unauthorized
        })?
        .claims;

        let now = self.clock.now_epoch_secs();
        if now < 0 {
            tracing::error!(timestamp = now, "clock reports a pre-epoch time");
            return Err(Error::Unauthorized);
        }
        if now >= claims.exp.saturating_add(self.leeway_secs) {
            tracing::debug!(exp = claims.exp, now, "session token expired");
            return Err(Error::Unauthorized);
        }
        Ok(claims)
    }

    /// Build the cookie that carries `token`.
    pub fn cookie(&self, token: String) -> SessionCookie {
        let now = DateTime::from_timestamp(self.clock.now_epoch_secs(), 0).unwrap_or_default();
        SessionCookie::new(token, now)
    }
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

impl fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthenticator")
            .field("secret", &self.secret)
            .field("ttl_secs", &self.ttl_secs)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

// ── Cookie ───────────────────────────────────────────────────────────

/// The `token` cookie: HTTP-only, path `/`, long outer expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub value: String,
    pub expires: DateTime<Utc>,
}

impl SessionCookie {
    pub fn new(token: String, now: DateTime<Utc>) -> Self {
        Self {
            value: token,
            expires: now + chrono::Duration::days(COOKIE_LIFETIME_DAYS),
        }
    }
}

/// Renders a `Set-Cookie` header value.
impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{COOKIE_NAME}={}; Path=/; Expires={}; HttpOnly",
            self.value,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    /// 2024-01-01 00:00:00 UTC
    const T0: i64 = 1_704_067_200;

    fn catalog() -> Catalog {
        Catalog {
            id: 7,
            name: "workshop".to_string(),
        }
    }

    fn authenticator_at(now: i64) -> SessionAuthenticator {
        SessionAuthenticator::new(SigningSecret::new("test-secret-with-enough-length!!").unwrap())
            .with_clock(Arc::new(FixedClock(now)))
    }

    fn assert_unauthorized(result: Result<Claims>) {
        match result {
            Err(e @ Error::Unauthorized) => assert_eq!(e.to_string(), "unauthorized"),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[test]
    fn test_issue_then_validate() {
        let auth = authenticator_at(T0);
        let token = auth.issue(&catalog()).unwrap();
        let claims = auth.validate(&token).unwrap();

        assert_eq!(claims.sub, "7");
        assert_eq!(claims.catalog_id(), Some(7));
        assert_eq!(claims.catalog_name, "workshop");
        assert_eq!(claims.iat, T0);
        assert_eq!(claims.exp, T0 + 3600);
    }

    #[test]
    fn test_token_valid_until_expiry() {
        let token = authenticator_at(T0).issue(&catalog()).unwrap();
        assert!(authenticator_at(T0 + 3599).validate(&token).is_ok());
        assert_unauthorized(authenticator_at(T0 + 3600).validate(&token));
        assert_unauthorized(authenticator_at(T0 + 86_400).validate(&token));
    }

    #[test]
    fn test_leeway_extends_expiry() {
        let token = authenticator_at(T0).issue(&catalog()).unwrap();
        let lenient = authenticator_at(T0 + 3630).with_leeway(Duration::from_secs(60));
        assert!(lenient.validate(&token).is_ok());
        let too_late = authenticator_at(T0 + 3700).with_leeway(Duration::from_secs(60));
        assert_unauthorized(too_late.validate(&token));
    }

    #[test]
    fn test_custom_ttl() {
        let auth = authenticator_at(T0).with_ttl(Duration::from_secs(60));
        let token = auth.issue(&catalog()).unwrap();
        assert_eq!(auth.validate(&token).unwrap().exp, T0 + 60);
    }

    #[test]
    fn test_oversized_durations_saturate() {
        let auth = authenticator_at(T0)
            .with_ttl(Duration::from_secs(u64::MAX))
            .with_leeway(Duration::from_secs(u64::MAX));
        let token = auth.issue(&catalog()).unwrap();
        let claims = auth.validate(&token).unwrap();
        assert_eq!(claims.exp, i64::MAX);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let auth = authenticator_at(T0);
        let token = auth.issue(&catalog()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged = Claims {
            sub: "1".to_string(),
            catalog_id: 1,
            catalog_name: "victim".to_string(),
            iat: T0,
            exp: T0 + 3600,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_unauthorized(auth.validate(&tampered));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = authenticator_at(T0).issue(&catalog()).unwrap();
        let other = SessionAuthenticator::new(SigningSecret::new("another-secret").unwrap())
            .with_clock(Arc::new(FixedClock(T0)));
        assert_unauthorized(other.validate(&token));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let secret = "test-secret-with-enough-length!!";
        let claims = Claims {
            sub: "7".to_string(),
            catalog_id: 7,
            catalog_name: "workshop".to_string(),
            iat: T0,
            exp: T0 + 3600,
        };
        let hs384 = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert_unauthorized(authenticator_at(T0).validate(&hs384));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            format!(r#"{{"sub":"7","catalog_id":7,"catalog_name":"x","iat":{T0},"exp":{}}}"#, T0 + 3600)
                .as_bytes(),
        );
        assert_unauthorized(authenticator_at(T0).validate(&format!("{header}.{payload}.")));
    }

    #[test]
    fn test_garbage_rejected() {
        let auth = authenticator_at(T0);
        for token in ["", "garbage", "a.b.c", "...."] {
            assert_unauthorized(auth.validate(token));
        }
    }

    #[test]
    fn test_missing_catalog_claim_rejected() {
        let secret = "test-secret-with-enough-length!!";
        let token = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({ "sub": "7", "exp": T0 + 3600 }),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert_unauthorized(authenticator_at(T0).validate(&token));
    }

    #[test]
    fn test_non_positive_catalog_id_is_none() {
        let mut claims = Claims {
            sub: "0".to_string(),
            catalog_id: 0,
            catalog_name: String::new(),
            iat: T0,
            exp: T0 + 1,
        };
        assert_eq!(claims.catalog_id(), None);
        claims.catalog_id = -3;
        assert_eq!(claims.catalog_id(), None);
    }

    #[test]
    fn test_pre_epoch_clock_rejects() {
        let token = authenticator_at(T0).issue(&catalog()).unwrap();
        assert_unauthorized(authenticator_at(-1000).validate(&token));
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = SigningSecret::new("super-secret-value").unwrap();
        let shown = format!("{secret:?}");
        assert!(!shown.contains("super-secret-value"));
        assert!(shown.contains("18 bytes"));
        assert!(SigningSecret::new("").is_err());
        assert!(SigningSecret::new(DEFAULT_JWT_SECRET).unwrap().is_insecure_default());
    }

    #[test]
    fn test_cookie_rendering() {
        let auth = authenticator_at(T0);
        let cookie = auth.cookie("abc.def.ghi".to_string());
        assert_eq!(
            cookie.to_string(),
            "token=abc.def.ghi; Path=/; Expires=Wed, 10 Apr 2024 00:00:00 GMT; HttpOnly"
        );
    }
}
