//! Configuration management for Roleguard Core

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Remote policy engine configuration
    pub policy_store: PolicyStoreConfig,
    /// Logging configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone)]
pub struct PolicyStoreConfig {
    /// Base URL of the policy engine (e.g., http://cerbos:3592)
    pub url: String,
    /// Basic-auth credentials for the admin API
    pub admin_username: String,
    pub admin_password: String,
    /// Upper bound for every request to the engine
    pub timeout_secs: u64,
    /// Resource kind used when a caller does not name one
    pub default_resource_kind: String,
}

impl PolicyStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for PolicyStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyStoreConfig")
            .field("url", &self.url)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("default_resource_kind", &self.default_resource_kind)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" for structured logs, anything else for the plain formatter
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "plain".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let timeout_secs: u64 = var("POLICY_STORE_TIMEOUT_SECS", "10")
            .parse()
            .context("Invalid POLICY_STORE_TIMEOUT_SECS")?;
        anyhow::ensure!(
            timeout_secs > 0,
            "POLICY_STORE_TIMEOUT_SECS must be greater than 0"
        );

        Ok(Self {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: var("DATABASE_MAX_CONNECTIONS", "10")
                    .parse()
                    .context("Invalid DATABASE_MAX_CONNECTIONS")?,
                min_connections: var("DATABASE_MIN_CONNECTIONS", "2")
                    .parse()
                    .context("Invalid DATABASE_MIN_CONNECTIONS")?,
            },
            policy_store: PolicyStoreConfig {
                url: var("POLICY_STORE_URL", "http://localhost:3592")
                    .trim_end_matches('/')
                    .to_string(),
                admin_username: var("POLICY_STORE_ADMIN_USERNAME", "cerbos"),
                admin_password: var("POLICY_STORE_ADMIN_PASSWORD", ""),
                timeout_secs,
                default_resource_kind: var("POLICY_STORE_RESOURCE_KIND", ""),
            },
            telemetry: TelemetryConfig {
                log_format: var("LOG_FORMAT", "plain").to_lowercase(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "mysql://localhost/test")]))
                .unwrap();

        assert_eq!(config.database.url, "mysql://localhost/test");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.min_connections, 2);
        assert_eq!(config.policy_store.url, "http://localhost:3592");
        assert_eq!(config.policy_store.admin_username, "cerbos");
        assert_eq!(config.policy_store.timeout(), Duration::from_secs(10));
        assert!(config.policy_store.default_resource_kind.is_empty());
        assert_eq!(config.telemetry.log_format, "plain");
    }

    #[test]
    fn test_config_requires_database_url() {
        let result = Config::from_lookup(lookup_from(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_invalid_timeout() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://localhost/test"),
            ("POLICY_STORE_TIMEOUT_SECS", "soon"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://localhost/test"),
            ("POLICY_STORE_TIMEOUT_SECS", "0"),
        ]));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("POLICY_STORE_TIMEOUT_SECS"));
    }

    #[test]
    fn test_config_rejects_invalid_pool_size() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://localhost/test"),
            ("DATABASE_MAX_CONNECTIONS", "lots"),
        ]));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Invalid DATABASE_MAX_CONNECTIONS"
        );

        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://localhost/test"),
            ("DATABASE_MIN_CONNECTIONS", "-1"),
        ]));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Invalid DATABASE_MIN_CONNECTIONS"
        );
    }

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://localhost/test"),
            ("POLICY_STORE_URL", "http://cerbos:3592/"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.policy_store.url, "http://cerbos:3592");
        assert_eq!(config.telemetry.log_format, "json");
    }

    #[test]
    fn test_policy_store_debug_redacts_password() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://localhost/test"),
            ("POLICY_STORE_ADMIN_PASSWORD", "hunter2"),
        ]))
        .unwrap();

        let rendered = format!("{:?}", config.policy_store);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
