//! Catalog password digests.
//!
//! The digest algorithm is a strategy: [`Argon2Scheme`] (salted, slow) for new
//! catalogs, [`LegacyMd5Scheme`] for databases populated by the old tooling,
//! which stored `base64(md5(password))`.

use std::str::FromStr;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};

use crate::error::{Error, Result};

pub trait PasswordScheme: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce the digest stored in `catalogs.password`.
    fn hash(&self, password: &str) -> Result<String>;

    /// Check a password against a stored digest. Unparseable digests never match.
    fn verify(&self, password: &str, digest: &str) -> bool;

    /// For deterministic schemes, the exact digest to look up.
    /// Salted schemes return `None` and are checked row by row.
    fn lookup_digest(&self, _password: &str) -> Option<String> {
        None
    }
}

/// Argon2id with a random salt, encoded as a PHC string.
#[derive(Default)]
pub struct Argon2Scheme {
    argon: Argon2<'static>,
}

impl PasswordScheme for Argon2Scheme {
    fn name(&self) -> &'static str {
        "argon2"
    }

    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::PasswordHash(e.to_string()))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self
                .argon
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Unsalted `base64(md5(password))`. Weak; kept so existing catalogs can log in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyMd5Scheme;

impl LegacyMd5Scheme {
    fn digest(password: &str) -> String {
        STANDARD.encode(Md5::digest(password.as_bytes()))
    }
}

impl PasswordScheme for LegacyMd5Scheme {
    fn name(&self) -> &'static str {
        "legacy-md5"
    }

    fn hash(&self, password: &str) -> Result<String> {
        Ok(Self::digest(password))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        Self::digest(password) == digest
    }

    fn lookup_digest(&self, password: &str) -> Option<String> {
        Some(Self::digest(password))
    }
}

/// Scheme selection, as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemeKind {
    #[default]
    Argon2,
    LegacyMd5,
}

impl SchemeKind {
    pub fn build(self) -> Box<dyn PasswordScheme> {
        match self {
            SchemeKind::Argon2 => Box::new(Argon2Scheme::default()),
            SchemeKind::LegacyMd5 => Box::new(LegacyMd5Scheme),
        }
    }
}

impl FromStr for SchemeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "argon2" | "argon2id" => Ok(SchemeKind::Argon2),
            "legacy-md5" | "md5" => Ok(SchemeKind::LegacyMd5),
            other => Err(Error::Config(format!("unknown password scheme {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_digest_matches_old_tooling() {
        // base64 of md5("password")
        assert_eq!(
            LegacyMd5Scheme.hash("password").unwrap(),
            "X03MO1qnZdYdgyfeuILPmQ=="
        );
        assert_eq!(
            LegacyMd5Scheme.lookup_digest("password").as_deref(),
            Some("X03MO1qnZdYdgyfeuILPmQ==")
        );
    }

    #[test]
    fn test_legacy_verify() {
        let digest = LegacyMd5Scheme.hash("s3cret").unwrap();
        assert!(LegacyMd5Scheme.verify("s3cret", &digest));
        assert!(!LegacyMd5Scheme.verify("S3cret", &digest));
    }

    #[test]
    fn test_argon2_is_salted() {
        let scheme = Argon2Scheme::default();
        let a = scheme.hash("s3cret").unwrap();
        let b = scheme.hash("s3cret").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(scheme.verify("s3cret", &a));
        assert!(scheme.verify("s3cret", &b));
        assert!(!scheme.verify("wrong", &a));
        assert!(scheme.lookup_digest("s3cret").is_none());
    }

    #[test]
    fn test_argon2_rejects_foreign_digest() {
        let scheme = Argon2Scheme::default();
        let legacy = LegacyMd5Scheme.hash("s3cret").unwrap();
        assert!(!scheme.verify("s3cret", &legacy));
    }

    #[test]
    fn test_scheme_kind_parse() {
        assert_eq!("argon2".parse::<SchemeKind>().unwrap(), SchemeKind::Argon2);
        assert_eq!(" Legacy-MD5 ".parse::<SchemeKind>().unwrap(), SchemeKind::LegacyMd5);
        assert!("bcrypt".parse::<SchemeKind>().is_err());
        assert_eq!(SchemeKind::LegacyMd5.build().name(), "legacy-md5");
    }
}
