//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BAZAAR_API_URL` - Base URL of the remote store API (http or https)
//!
//! ## Optional
//! - `BAZAAR_API_TIMEOUT_SECS` - Per-request timeout (default: 15)
//! - `BAZAAR_CURRENCY` - ISO 4217 store currency; orders priced in any other are not charged (default: INR)
//! - `BAZAAR_STORE_NAME` - Name shown in the payment gateway (default: Bazaar)
//! - `BAZAAR_GATEWAY_KEY_ID` - Public key ID for the payment gateway
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//!
//! ## Session (front ends that authenticate from the environment)
//! - `BAZAAR_USER_ID` - Customer ID
//! - `BAZAAR_ACCESS_TOKEN` - Bearer token for the remote store

use std::collections::HashMap;
use std::time::Duration;

use bazaar_core::{CurrencyCode, UserId};
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::session::Credentials;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront engine configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Remote store API settings
    pub api: RemoteStoreConfig,
    /// Store currency. Cart totals are shown in it and created orders must
    /// be priced in it.
    pub currency: CurrencyCode,
    /// Payment gateway settings
    pub gateway: GatewayConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Remote store API configuration.
#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    /// Base URL; endpoint paths are joined onto it
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Payment gateway configuration. Holds only values that are safe to hand to
/// the gateway's client-side UI.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Public key ID
    pub key_id: Option<String>,
    /// Merchant name shown in the gateway UI
    pub store_name: String,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = parse_base_url(&required(&lookup, "BAZAAR_API_URL")?)?;
        let timeout_secs = lookup("BAZAAR_API_TIMEOUT_SECS")
            .map_or(Ok(DEFAULT_TIMEOUT_SECS), |raw| {
                raw.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidEnvVar("BAZAAR_API_TIMEOUT_SECS".to_string(), e.to_string())
                })
            })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BAZAAR_API_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let currency = lookup("BAZAAR_CURRENCY")
            .map_or(Ok(CurrencyCode::default()), |raw| {
                raw.parse::<CurrencyCode>()
                    .map_err(|e| ConfigError::InvalidEnvVar("BAZAAR_CURRENCY".to_string(), e.to_string()))
            })?;

        Ok(Self {
            api: RemoteStoreConfig {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            currency,
            gateway: GatewayConfig {
                key_id: lookup("BAZAAR_GATEWAY_KEY_ID"),
                store_name: lookup("BAZAAR_STORE_NAME").unwrap_or_else(|| "Bazaar".to_string()),
            },
            sentry_dsn: lookup("SENTRY_DSN"),
            sentry_environment: lookup("SENTRY_ENVIRONMENT"),
        })
    }
}

/// Load session credentials from `BAZAAR_USER_ID` / `BAZAAR_ACCESS_TOKEN`.
///
/// Returns `Ok(None)` when neither is set.
///
/// # Errors
///
/// Returns `ConfigError` if only one of the two is set, or if the token looks
/// like a placeholder or has too little entropy.
pub fn credentials_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<Credentials>, ConfigError> {
    match (lookup("BAZAAR_USER_ID"), lookup("BAZAAR_ACCESS_TOKEN")) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::MissingEnvVar("BAZAAR_ACCESS_TOKEN".to_string())),
        (None, Some(_)) => Err(ConfigError::MissingEnvVar("BAZAAR_USER_ID".to_string())),
        (Some(user_id), Some(token)) => {
            validate_secret_strength(&token, "BAZAAR_ACCESS_TOKEN")?;
            Ok(Some(Credentials::new(
                UserId::new(user_id),
                SecretString::from(token),
            )))
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required variable.
fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse the API base URL. A trailing slash is added so relative joins keep
/// any path prefix.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidEnvVar("BAZAAR_API_URL".to_string(), msg);

    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config =
            StorefrontConfig::from_lookup(lookup_from(&[("BAZAAR_API_URL", "https://api.shop.test/v1")]))
                .unwrap();
        assert_eq!(config.api.base_url.as_str(), "https://api.shop.test/v1/");
        assert_eq!(config.api.timeout, Duration::from_secs(15));
        assert_eq!(config.currency, CurrencyCode::INR);
        assert_eq!(config.gateway.store_name, "Bazaar");
        assert!(config.gateway.key_id.is_none());
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_missing_api_url() {
        let err = StorefrontConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "BAZAAR_API_URL"));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err = StorefrontConfig::from_lookup(lookup_from(&[("BAZAAR_API_URL", "ftp://x.test")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = StorefrontConfig::from_lookup(lookup_from(&[
            ("BAZAAR_API_URL", "http://localhost:8080"),
            ("BAZAAR_API_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_parses_optional_values() {
        let config = StorefrontConfig::from_lookup(lookup_from(&[
            ("BAZAAR_API_URL", "http://localhost:8080/api/"),
            ("BAZAAR_API_TIMEOUT_SECS", "3"),
            ("BAZAAR_CURRENCY", "usd"),
            ("BAZAAR_GATEWAY_KEY_ID", "rzp_test_abc"),
            ("BAZAAR_STORE_NAME", "Corner Shop"),
        ]))
        .unwrap();
        assert_eq!(config.api.base_url.as_str(), "http://localhost:8080/api/");
        assert_eq!(config.api.timeout, Duration::from_secs(3));
        assert_eq!(config.currency, CurrencyCode::USD);
        assert_eq!(config.gateway.key_id.as_deref(), Some("rzp_test_abc"));
        assert_eq!(config.gateway.store_name, "Corner Shop");
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-token-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_credentials_absent() {
        assert!(credentials_from_lookup(lookup_from(&[])).unwrap().is_none());
    }

    #[test]
    fn test_credentials_require_both_values() {
        let err = credentials_from_lookup(lookup_from(&[("BAZAAR_USER_ID", "u1")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "BAZAAR_ACCESS_TOKEN"));
    }

    #[test]
    fn test_credentials_loaded() {
        let creds = credentials_from_lookup(lookup_from(&[
            ("BAZAAR_USER_ID", "u1"),
            ("BAZAAR_ACCESS_TOKEN", "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(creds.user_id().as_str(), "u1");
        assert_eq!(creds.token().expose_secret(), "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6");
    }
}
