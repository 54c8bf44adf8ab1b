//! Image fetch pipeline with a local cache in front of the CDN.
//!
//! ### Source
//! - Images live at `<base>/<resolution>/<name>`; the resolution comes from the request category.
//! - Bodies are streamed to disk chunk by chunk, never buffered whole.
//! - Per-image timeout (default: 10s) and body size limit.
//!
//! ### Batch
//! - Bounded concurrency (default: 10 workers).
//! - Cache hits are copied into the request staging area without touching the network.
//! - Per-image failures never abort the batch; successes are reported in request order.

pub mod batch;
pub mod source;
pub mod url;

use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

pub use batch::{FetchOutcome, FetchReport, FetchSummary, Fetcher, StagingArea};
pub use source::ImageSource;
pub use self::url::{UrlError, image_url, parse_base};

use imgdup_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// CDN base URL (default: "https://image.tmdb.org/t/p")
    pub base_url: String,

    /// User agent string (default: "imgdup/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 20MB)
    pub max_bytes: u64,

    /// Request timeout (default: 10s)
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://image.tmdb.org/t/p".to_string(),
            user_agent: "imgdup/0.1".to_string(),
            max_bytes: 20 * 1024 * 1024,
            timeout: Duration::from_millis(10_000),
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.image_base_url.clone(),
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
        }
    }
}

/// HTTP client for the image CDN.
pub struct FetchClient {
    http: Client,
    base: ::url::Url,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let base = parse_base(&config.base_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, base, config })
    }

    /// Base URL all image URLs are built from.
    pub fn base(&self) -> &::url::Url {
        &self.base
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Stream the body at `url` into `dest`.
    ///
    /// The body is written to a sibling `.part` file and renamed into place only once complete, so
    /// a failed download never leaves a truncated image behind. Returns the number of bytes written.
    pub async fn download(&self, url: &::url::Url, dest: &Path) -> Result<u64, Error> {
        let start = Instant::now();
        let part = part_path(dest);

        let written = match self.stream_to(url, &part).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| Error::io(dest, e))?;

        tracing::debug!("fetched {} in {}ms ({} bytes)", url, start.elapsed().as_millis(), written);

        Ok(written)
    }

    async fn stream_to(&self, url: &::url::Url, part: &Path) -> Result<u64, Error> {
        let mut response = self
            .http
            .get(url.as_str())
            .header("Accept", "image/avif,image/webp,image/png,image/jpeg,image/*;q=0.8,*/*;q=0.5")
            .send()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(url, status));
        }

        if let Some(len) = response.content_length()
            && len > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| Error::io(part, e))?;

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| map_transport_error(url, e))?
        {
            written += chunk.len() as u64;
            if written > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!("more than {} bytes", self.config.max_bytes)));
            }
            file.write_all(&chunk).await.map_err(|e| Error::io(part, e))?;
        }

        file.flush().await.map_err(|e| Error::io(part, e))?;

        Ok(written)
    }
}

fn part_path(dest: &Path) -> std::path::PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{file_name}.part"))
}

fn map_transport_error(url: &::url::Url, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(url.to_string())
    } else {
        Error::HttpError(format!("network error: {}", err))
    }
}

fn http_status_error(url: &::url::Url, status: StatusCode) -> Error {
    Error::HttpError(format!("status {} for {}", status.as_u16(), url))
}
