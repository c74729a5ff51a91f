//! Runtime configuration
//!
//! Loaded from TOML, then overridden by environment variables:
//! - `SMICRAB_API_URL`
//! - `SMICRAB_POLL_INTERVAL_MS`

use serde::{Deserialize, Serialize};
use smicrab_cache::DEFAULT_CAPACITY;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `api_url`
pub const ENV_API_URL: &str = "SMICRAB_API_URL";

/// Environment variable overriding `poll_interval_ms`
pub const ENV_POLL_INTERVAL_MS: &str = "SMICRAB_POLL_INTERVAL_MS";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment override could not be parsed
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    /// Semantically invalid setting
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Sync layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Backend base URL
    pub api_url: String,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Per-request timeout; transport default when unset
    pub request_timeout_ms: Option<u64>,
    /// Maximum cached completed analyses
    pub cache_capacity: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            poll_interval_ms: 10_000,
            request_timeout_ms: None,
            cache_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backend URL
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set cache capacity
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Polling interval
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Request timeout, if configured
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Parse TOML; missing keys take defaults
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed input, `ConfigError::Invalid` if
    /// the result fails [`validate`](Self::validate).
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides
    ///
    /// # Errors
    /// Any `ConfigError` from reading, parsing, overriding or validating.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };
        let config = config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    ///
    /// # Errors
    /// `ConfigError::InvalidEnv` if the interval override is not an integer.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_POLL_INTERVAL_MS,
                value: raw,
            })?;
        }
        Ok(self)
    }

    /// Check settings are usable
    ///
    /// # Errors
    /// `ConfigError::Invalid` describing the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api_url must be an http(s) URL, got {:?}",
                self.api_url
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
