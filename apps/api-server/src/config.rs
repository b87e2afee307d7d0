//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::redirect::TrustPolicy;
use domain::validate::{ValidatorConfig, DEFAULT_BLOCKED_SHORTENERS};
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else {
            Self::Memory
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: PathBuf,
    /// Log format
    pub log_format: LogFormat,
    /// Public base URL for generated short URLs, e.g. `https://sho.rt`
    pub shortlink_domain: Option<String>,
    /// Host the service is reachable under; refused as a shortening target
    pub own_domain: String,
    /// Shortener domains refused as targets
    pub blocked_shorteners: Vec<String>,
    /// Require confirmation for targets outside `trusted_hosts`
    pub strict_external_redirects: bool,
    /// Hosts redirected to without confirmation in strict mode
    pub trusted_hosts: Vec<String>,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Capacity of the report notification queue
    pub notify_queue_capacity: usize,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = match get("PORT") {
            Some(s) => s.trim().parse().map_err(|e| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}': {}", s, e),
            })?,
            None => 3001,
        };

        // Storage provider
        let storage_provider =
            StorageProvider::from_str(&get("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()));

        // DB path (for sqlite)
        let db_path = PathBuf::from(get("DB_PATH").unwrap_or_else(|| "./data/urls.db".into()));

        // Log format
        let log_format = LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Shortlink domain; its host doubles as our own domain
        let shortlink_domain = get("SHORTLINK_DOMAIN").filter(|s| !s.trim().is_empty());
        let own_domain = match &shortlink_domain {
            Some(base) => url::Url::parse(base)
                .ok()
                .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
                .ok_or_else(|| ConfigError {
                    field: "SHORTLINK_DOMAIN",
                    message: format!("Expected an absolute URL like https://sho.rt, got '{}'", base),
                })?,
            None => get("PUBLIC_HOST")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "localhost".into()),
        };

        // Shortener block-list
        let blocked_shorteners = match get("BLOCKED_SHORTENERS") {
            Some(list) => http_common::split_csv(&list),
            None => DEFAULT_BLOCKED_SHORTENERS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        };

        // Strict external redirects
        let strict_external_redirects = get("STRICT_EXTERNAL_REDIRECTS")
            .map(|v| http_common::is_truthy(&v))
            .unwrap_or(false);
        let trusted_hosts = get("TRUSTED_HOSTS")
            .map(|v| http_common::split_csv(&v))
            .unwrap_or_default();

        // CORS allow origin
        let cors_origin_str = get("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Notification queue
        let notify_queue_capacity = match get("NOTIFY_QUEUE_CAPACITY") {
            Some(s) => match s.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError {
                        field: "NOTIFY_QUEUE_CAPACITY",
                        message: format!("Expected a positive integer, got '{}'", s),
                    })
                }
            },
            None => 256,
        };

        Ok(Self {
            port,
            storage_provider,
            db_path,
            log_format,
            shortlink_domain,
            own_domain,
            blocked_shorteners,
            strict_external_redirects,
            trusted_hosts,
            cors_allow_origin,
            notify_queue_capacity,
        })
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig::new(&self.blocked_shorteners, Some(self.own_domain.clone()))
    }

    pub fn trust_policy(&self) -> TrustPolicy {
        TrustPolicy::new(self.strict_external_redirects, &self.trusted_hosts)
    }

    /// Log warnings about risky configuration.
    pub fn warn_if_insecure(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: links and reports are lost on restart.");
        }
        if self.blocked_shorteners.is_empty() {
            tracing::warn!(
                "BLOCKED_SHORTENERS is empty: links to other shorteners will be accepted."
            );
        }
        if self.strict_external_redirects && self.trusted_hosts.is_empty() {
            tracing::warn!(
                "STRICT_EXTERNAL_REDIRECTS is set without TRUSTED_HOSTS: every redirect \
                 requires confirmation."
            );
        }
    }
}
