//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (IMGDUP_*)
//! 2. TOML config file (if IMGDUP_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (IMGDUP_*)
/// 2. TOML config file (if IMGDUP_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the WebSocket server listens on.
    ///
    /// Set via IMGDUP_BIND_ADDR environment variable.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory holding cached images.
    ///
    /// Set via IMGDUP_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Parent directory for request-scoped staging areas.
    ///
    /// Set via IMGDUP_STAGING_DIR environment variable.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Cache size ceiling in bytes; exceeding it at startup clears the whole cache.
    ///
    /// Set via IMGDUP_CACHE_MAX_BYTES environment variable.
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: u64,

    /// Number of images fetched in parallel.
    ///
    /// Set via IMGDUP_FETCH_CONCURRENCY environment variable.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Per-image HTTP timeout in milliseconds.
    ///
    /// Set via IMGDUP_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted for a single image.
    ///
    /// Set via IMGDUP_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// CDN base URL; images are fetched from `<base>/<resolution>/<name>`.
    ///
    /// Set via IMGDUP_IMAGE_BASE_URL environment variable.
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via IMGDUP_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Similarity threshold used when a request omits one or sends garbage.
    ///
    /// Set via IMGDUP_DEFAULT_THRESHOLD environment variable.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    /// Optional bound on the duplicate detection stage, in milliseconds.
    ///
    /// Set via IMGDUP_DETECT_TIMEOUT_MS environment variable. Unset means no bound.
    #[serde(default)]
    pub detect_timeout_ms: Option<u64>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8765".into()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./imgdup_cache")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./imgdup_staging")
}

fn default_cache_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_fetch_concurrency() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_image_base_url() -> String {
    "https://image.tmdb.org/t/p".into()
}

fn default_user_agent() -> String {
    "imgdup/0.1".into()
}

fn default_threshold() -> f64 {
    crate::model::DEFAULT_THRESHOLD
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cache_dir: default_cache_dir(),
            staging_dir: default_staging_dir(),
            cache_max_bytes: default_cache_max_bytes(),
            fetch_concurrency: default_fetch_concurrency(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            image_base_url: default_image_base_url(),
            user_agent: default_user_agent(),
            default_threshold: default_threshold(),
            detect_timeout_ms: None,
        }
    }
}

impl AppConfig {
    /// Per-image timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Detection stage bound, if configured.
    pub fn detect_timeout(&self) -> Option<Duration> {
        self.detect_timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `IMGDUP_`
    /// 2. TOML file from `IMGDUP_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("IMGDUP_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("IMGDUP_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
