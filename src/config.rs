//! Runtime configuration for ReasonKit Hooks
//!
//! All deployment-specific settings are read from environment variables at
//! startup. The encryption key is required: the process refuses to start
//! without it, so a misconfigured deployment fails fast instead of writing
//! secrets it can never read back.
//!
//! # Environment Variables
//!
//! - `REASONKIT_HOOKS_ENCRYPTION_KEY` (required): master key for secret
//!   encryption at rest
//! - `REASONKIT_HOOKS_PUBLIC_URL` (optional): externally reachable base URL,
//!   used to reconstruct canonical intake URLs for replay (default:
//!   `http://{host}:{port}`)
//! - `REASONKIT_HOOKS_MAX_CONCURRENT_FORWARDS` (optional): bound on detached
//!   forwarding tasks (default: 32)
//! - `REASONKIT_HOOKS_PROVIDER_API_BASE` (optional): provider REST API base
//!   for classic resource fetches
//! - `REASONKIT_HOOKS_CORS_ORIGINS` (optional): comma-separated origin
//!   allow-list for the management API (default: localhost origins only)

use std::env;

use tracing::{info, warn};

use crate::error::ConfigError;

/// Default bound on concurrently running detached forwarding tasks
pub const DEFAULT_MAX_CONCURRENT_FORWARDS: usize = 32;

/// Default provider API base for the HTTP resource fetcher
pub const DEFAULT_PROVIDER_API_BASE: &str = "https://api.payments.example/v2";

/// Application configuration resolved from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Master key for the secret cipher (never logged)
    pub encryption_key: String,

    /// Externally reachable base URL, no trailing slash
    pub public_url: String,

    /// Bound on detached forwarding tasks
    pub max_concurrent_forwards: usize,

    /// Provider REST API base, no trailing slash
    pub provider_api_base: String,

    /// Explicit CORS origin allow-list; empty means localhost-only
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    /// Read configuration from environment variables.
    ///
    /// `host` and `port` feed the default public URL when
    /// `REASONKIT_HOOKS_PUBLIC_URL` is unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEncryptionKey` if the key env var is not
    /// set, and `ConfigError::InvalidValue`/`InvalidPublicUrl` for malformed
    /// optional settings.
    pub fn from_env(host: &str, port: u16) -> Result<Self, ConfigError> {
        let encryption_key = env::var("REASONKIT_HOOKS_ENCRYPTION_KEY")
            .map_err(|_| ConfigError::MissingEncryptionKey)?;

        if encryption_key.is_empty() {
            return Err(ConfigError::MissingEncryptionKey);
        }
        if encryption_key.len() < 16 {
            warn!("REASONKIT_HOOKS_ENCRYPTION_KEY is less than 16 characters");
        }

        let public_url = match env::var("REASONKIT_HOOKS_PUBLIC_URL") {
            Ok(raw) => normalize_base_url(&raw)?,
            Err(_) => {
                let fallback = format!("http://{}:{}", host, port);
                info!(url = %fallback, "REASONKIT_HOOKS_PUBLIC_URL unset, using bind address");
                fallback
            }
        };

        let max_concurrent_forwards = match env::var("REASONKIT_HOOKS_MAX_CONCURRENT_FORWARDS") {
            Ok(raw) => {
                let parsed: usize =
                    raw.parse().map_err(|_| ConfigError::InvalidValue {
                        var: "REASONKIT_HOOKS_MAX_CONCURRENT_FORWARDS".to_string(),
                        message: format!("not an integer: {}", raw),
                    })?;
                if parsed == 0 {
                    return Err(ConfigError::InvalidValue {
                        var: "REASONKIT_HOOKS_MAX_CONCURRENT_FORWARDS".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                parsed
            }
            Err(_) => DEFAULT_MAX_CONCURRENT_FORWARDS,
        };

        let provider_api_base = match env::var("REASONKIT_HOOKS_PROVIDER_API_BASE") {
            Ok(raw) => normalize_base_url(&raw)?,
            Err(_) => DEFAULT_PROVIDER_API_BASE.to_string(),
        };

        let cors_origins = match env::var("REASONKIT_HOOKS_CORS_ORIGINS") {
            Ok(raw) => parse_origin_list(&raw)?,
            Err(_) => Vec::new(),
        };

        info!(
            max_concurrent_forwards,
            provider_api_base = %provider_api_base,
            cors_origins = cors_origins.len(),
            "Configuration loaded"
        );

        Ok(Self {
            encryption_key,
            public_url,
            max_concurrent_forwards,
            provider_api_base,
            cors_origins,
        })
    }

    /// Create a test configuration (for testing only)
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            encryption_key: "test-master-key-for-unit-tests".to_string(),
            public_url: "http://127.0.0.1:3020".to_string(),
            max_concurrent_forwards: 4,
            provider_api_base: "http://127.0.0.1:1".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

/// Validate a base URL and strip any trailing slash.
fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let parsed =
        url::Url::parse(raw).map_err(|e| ConfigError::InvalidPublicUrl(e.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidPublicUrl(format!(
            "unsupported scheme: {}",
            parsed.scheme()
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Parse a comma-separated origin list, validating each entry as an
/// http(s) URL.
fn parse_origin_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            normalize_base_url(entry).map_err(|_| ConfigError::InvalidValue {
                var: "REASONKIT_HOOKS_CORS_ORIGINS".to_string(),
                message: format!("not an http(s) origin: {}", entry),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url_strips_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://hooks.example.com/").unwrap(),
            "https://hooks.example.com"
        );
        assert_eq!(
            normalize_base_url("http://localhost:3020").unwrap(),
            "http://localhost:3020"
        );
    }

    #[test]
    fn test_normalize_base_url_rejects_garbage() {
        assert!(normalize_base_url("not a url").is_err());
        assert!(normalize_base_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_test_config() {
        let config = AppConfig::test_config();
        assert!(!config.encryption_key.is_empty());
        assert!(config.max_concurrent_forwards > 0);
    }

    #[test]
    fn test_parse_origin_list() {
        let origins =
            parse_origin_list("https://ops.example.com, http://localhost:5173,").unwrap();
        assert_eq!(
            origins,
            vec![
                "https://ops.example.com".to_string(),
                "http://localhost:5173".to_string()
            ]
        );

        assert!(parse_origin_list("https://ok.example.com,garbage").is_err());
        assert!(parse_origin_list("").unwrap().is_empty());
    }
}
