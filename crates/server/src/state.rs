//! Application state.

use std::sync::Arc;

use imgdup_client::{FetchClient, FetchConfig, Fetcher, PerceptualBackend, SimilarityBackend};
use imgdup_core::{AppConfig, ContentCache, Error};

use crate::pipeline::Pipeline;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        Self { config: Arc::new(config), pipeline }
    }

    /// Wire the production cache, CDN client and perceptual backend.
    pub async fn from_config(config: AppConfig) -> Result<Self, Error> {
        let cache = ContentCache::open(&config.cache_dir, config.cache_max_bytes).await?;
        let stats = cache.stats().await?;
        tracing::info!(
            path = %cache.root().display(),
            entries = stats.entries,
            total_bytes = stats.total_bytes,
            max_bytes = cache.max_bytes(),
            "content cache ready"
        );

        let source = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
        let fetcher = Fetcher::new(cache, source, &config.staging_dir, config.fetch_concurrency);
        let backend: Arc<dyn SimilarityBackend> = Arc::new(PerceptualBackend::new());
        let pipeline = Pipeline::new(fetcher, backend, config.detect_timeout());

        Ok(Self::new(config, pipeline))
    }
}
