use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::password::SchemeKind;
use crate::session::{
    SessionAuthenticator, SigningSecret, DEFAULT_JWT_SECRET, DEFAULT_SESSION_TTL, MAX_SESSION_LEEWAY,
    MAX_SESSION_TTL, MIN_SECRET_LEN,
};
use crate::store::{DEFAULT_TX_TIMEOUT, MAX_TX_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::Config(format!("unknown environment {other:?}"))),
        }
    }
}

/// Runtime settings, read from the environment.
///
/// | variable | default |
/// |---|---|
/// | `DATABASE_URL` | `$HOME/.tagbox/catalog.db` (`sqlite://` prefix accepted) |
/// | `JWT_SECRET` | insecure development secret |
/// | `TAGBOX_ENV` | `development` |
/// | `SESSION_TTL_SECS` | `3600` (at most 30 days) |
/// | `SESSION_LEEWAY_SECS` | `0` (at most 3600) |
/// | `TX_TIMEOUT_MS` | `5000` (at most 600000) |
/// | `PASSWORD_SCHEME` | `argon2` |
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub jwt_secret: SigningSecret,
    pub environment: Environment,
    pub session_ttl: Duration,
    pub session_leeway: Duration,
    pub tx_timeout: Duration,
    pub password_scheme: SchemeKind,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset and blank values take defaults;
    /// values that fail to parse are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_path = match get("DATABASE_URL") {
            Some(url) => parse_database_url(&url),
            None => default_database_path(),
        };

        let jwt_secret =
            SigningSecret::new(get("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()))?;

        let environment = get("TAGBOX_ENV")
            .map(|v| v.parse::<Environment>())
            .transpose()?
            .unwrap_or_default();

        let password_scheme = get("PASSWORD_SCHEME")
            .map(|v| v.parse::<SchemeKind>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            database_path,
            jwt_secret,
            environment,
            session_ttl: parse_number(&get, "SESSION_TTL_SECS", MAX_SESSION_TTL.as_secs())?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SESSION_TTL),
            session_leeway: parse_number(&get, "SESSION_LEEWAY_SECS", MAX_SESSION_LEEWAY.as_secs())?
                .map(Duration::from_secs)
                .unwrap_or(Duration::ZERO),
            tx_timeout: parse_number(&get, "TX_TIMEOUT_MS", MAX_TX_TIMEOUT.as_millis() as u64)?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TX_TIMEOUT),
            password_scheme,
        })
    }

    /// Session authenticator using this config's secret, lifetime and leeway.
    pub fn session_authenticator(&self) -> SessionAuthenticator {
        SessionAuthenticator::new(self.jwt_secret.clone())
            .with_ttl(self.session_ttl)
            .with_leeway(self.session_leeway)
    }

    /// Refuse insecure secrets in production; only warn in development.
    pub fn validate_for_production(&self) -> Result<()> {
        let production = self.environment == Environment::Production;

        if self.jwt_secret.is_insecure_default() {
            if production {
                return Err(Error::Config(
                    "refusing the default JWT secret in production; set JWT_SECRET".to_string(),
                ));
            }
            tracing::warn!("using the default JWT secret; set JWT_SECRET before deploying");
        } else if self.jwt_secret.len() < MIN_SECRET_LEN {
            if production {
                return Err(Error::Config(format!(
                    "JWT secret is {} bytes, production requires at least {MIN_SECRET_LEN}",
                    self.jwt_secret.len()
                )));
            }
            tracing::warn!(
                len = self.jwt_secret.len(),
                min = MIN_SECRET_LEN,
                "JWT secret is shorter than recommended"
            );
        }

        if self.session_ttl.is_zero() || self.session_ttl > MAX_SESSION_TTL {
            return Err(Error::Config(format!(
                "SESSION_TTL_SECS must be between 1 and {}",
                MAX_SESSION_TTL.as_secs()
            )));
        }
        if self.session_leeway > MAX_SESSION_LEEWAY {
            return Err(Error::Config(format!(
                "SESSION_LEEWAY_SECS must be at most {}",
                MAX_SESSION_LEEWAY.as_secs()
            )));
        }
        if self.tx_timeout.is_zero() || self.tx_timeout > MAX_TX_TIMEOUT {
            return Err(Error::Config(format!(
                "TX_TIMEOUT_MS must be between 1 and {}",
                MAX_TX_TIMEOUT.as_millis()
            )));
        }
        Ok(())
    }
}

fn parse_number(get: &impl Fn(&str) -> Option<String>, key: &str, max: u64) -> Result<Option<u64>> {
    get(key)
        .map(|v| {
            let n = v
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {v:?}")))?;
            if n > max {
                return Err(Error::Config(format!("{key} must be at most {max}, got {n}")));
            }
            Ok(n)
        })
        .transpose()
}

fn parse_database_url(url: &str) -> PathBuf {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(path)
}

pub fn default_database_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".tagbox").join("catalog.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert!(config.database_path.ends_with(".tagbox/catalog.db"));
        assert!(config.jwt_secret.is_insecure_default());
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.session_leeway, Duration::ZERO);
        assert_eq!(config.tx_timeout, Duration::from_millis(5000));
        assert_eq!(config.password_scheme, SchemeKind::Argon2);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "sqlite:///var/lib/tagbox.db"),
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("TAGBOX_ENV", "production"),
            ("SESSION_TTL_SECS", "600"),
            ("SESSION_LEEWAY_SECS", "5"),
            ("TX_TIMEOUT_MS", "250"),
            ("PASSWORD_SCHEME", "legacy-md5"),
        ])
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/tagbox.db"));
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.session_ttl, Duration::from_secs(600));
        assert_eq!(config.session_leeway, Duration::from_secs(5));
        assert_eq!(config.tx_timeout, Duration::from_millis(250));
        assert_eq!(config.password_scheme, SchemeKind::LegacyMd5);
        assert!(config.validate_for_production().is_ok());
    }

    #[test]
    fn test_database_url_forms() {
        assert_eq!(parse_database_url("sqlite://data/a.db"), PathBuf::from("data/a.db"));
        assert_eq!(parse_database_url("sqlite:a.db"), PathBuf::from("a.db"));
        assert_eq!(parse_database_url("/tmp/a.db"), PathBuf::from("/tmp/a.db"));
    }

    #[test]
    fn test_blank_values_take_defaults() {
        let config = config_from(&[("JWT_SECRET", "  "), ("TX_TIMEOUT_MS", "")]).unwrap();
        assert!(config.jwt_secret.is_insecure_default());
        assert_eq!(config.tx_timeout, DEFAULT_TX_TIMEOUT);
    }

    #[test]
    fn test_unparseable_values_are_errors() {
        assert!(matches!(config_from(&[("TX_TIMEOUT_MS", "soon")]), Err(Error::Config(_))));
        assert!(matches!(config_from(&[("SESSION_TTL_SECS", "-1")]), Err(Error::Config(_))));
        assert!(matches!(config_from(&[("TAGBOX_ENV", "staging")]), Err(Error::Config(_))));
        assert!(matches!(config_from(&[("PASSWORD_SCHEME", "rot13")]), Err(Error::Config(_))));
    }

    #[test]
    fn test_production_rejects_default_secret() {
        let config = config_from(&[("TAGBOX_ENV", "prod")]).unwrap();
        assert!(matches!(config.validate_for_production(), Err(Error::Config(_))));
    }

    #[test]
    fn test_production_rejects_short_secret() {
        let config = config_from(&[("TAGBOX_ENV", "production"), ("JWT_SECRET", "short")]).unwrap();
        assert!(matches!(config.validate_for_production(), Err(Error::Config(_))));
    }

    #[test]
    fn test_development_allows_weak_secret() {
        assert!(config_from(&[]).unwrap().validate_for_production().is_ok());
        let short = config_from(&[("JWT_SECRET", "short")]).unwrap();
        assert!(short.validate_for_production().is_ok());
    }

    #[test]
    fn test_out_of_range_numbers_rejected() {
        for key in ["SESSION_TTL_SECS", "SESSION_LEEWAY_SECS", "TX_TIMEOUT_MS"] {
            let err = config_from(&[(key, "18446744073709551615")]).unwrap_err();
            assert!(matches!(err, Error::Config(ref msg) if msg.contains(key)));
        }
        assert!(config_from(&[("SESSION_TTL_SECS", "2592001")]).is_err());
        assert!(config_from(&[("SESSION_LEEWAY_SECS", "3601")]).is_err());
        assert!(config_from(&[("TX_TIMEOUT_MS", "600001")]).is_err());

        let config = config_from(&[
            ("SESSION_TTL_SECS", "2592000"),
            ("SESSION_LEEWAY_SECS", "3600"),
            ("TX_TIMEOUT_MS", "600000"),
        ])
        .unwrap();
        assert!(config.validate_for_production().is_ok());
    }

    #[test]
    fn test_oversized_fields_fail_validation() {
        let mut config = config_from(&[]).unwrap();
        config.session_ttl = Duration::from_secs(u64::MAX);
        assert!(config.validate_for_production().is_err());

        let mut config = config_from(&[]).unwrap();
        config.tx_timeout = Duration::from_millis(u64::MAX);
        assert!(config.validate_for_production().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = config_from(&[("TX_TIMEOUT_MS", "0")]).unwrap();
        assert!(config.validate_for_production().is_err());
        let config = config_from(&[("SESSION_TTL_SECS", "0")]).unwrap();
        assert!(config.validate_for_production().is_err());
    }
}
