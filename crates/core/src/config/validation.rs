//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `fetch_concurrency` is 0 or exceeds 64
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` or `cache_max_bytes` is 0
    /// - `user_agent` is empty
    /// - `image_base_url` is not an http(s) URL
    /// - `default_threshold` lies outside [0, 1]
    /// - `cache_dir` and `staging_dir` are the same directory
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch_concurrency".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.fetch_concurrency > 64 {
            return Err(ConfigError::Invalid { field: "fetch_concurrency".into(), reason: "must not exceed 64".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.cache_max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_max_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if !(self.image_base_url.starts_with("https://") || self.image_base_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                field: "image_base_url".into(),
                reason: "must be an http(s) URL".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.default_threshold) {
            return Err(ConfigError::Invalid {
                field: "default_threshold".into(),
                reason: "must be within [0, 1]".into(),
            });
        }

        if self.cache_dir == self.staging_dir {
            return Err(ConfigError::Invalid {
                field: "staging_dir".into(),
                reason: "must differ from cache_dir".into(),
            });
        }

        if self.detect_timeout_ms == Some(0) {
            tracing::warn!("detect_timeout_ms is 0; every detection will time out and yield no duplicates");
        }

        Ok(())
    }
}
