//! Concurrent batch fetch into a request-scoped staging area.
//!
//! Fetches many images in parallel with bounded concurrency. Results are reported in request
//! order regardless of completion order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use imgdup_core::model::validate_image_name;
use imgdup_core::{ContentCache, Error, ImageCategory, ImageName};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::ImageSource;

/// Request-scoped directory holding the images a similarity backend will read.
#[derive(Debug, Clone)]
pub struct StagingArea {
    path: PathBuf,
}

impl StagingArea {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the staged copy of `name`.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Result of fetching one requested image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub name: ImageName,
    pub success: bool,
    /// Served from the content cache rather than the network.
    pub cached: bool,
    /// Failure reason (if success is false).
    pub error: Option<String>,
}

impl FetchOutcome {
    fn succeeded(name: ImageName, cached: bool) -> Self {
        Self { name, success: true, cached, error: None }
    }

    fn failed(name: ImageName, error: impl Into<String>) -> Self {
        Self { name, success: false, cached: false, error: Some(error.into()) }
    }
}

/// Batch summary statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Number of names requested, repeats included.
    pub requested: u32,
    /// Number of images staged.
    pub succeeded: u32,
    /// Number of staged images that came from the cache.
    pub cached: u32,
    /// Number of failed images.
    pub failed: u32,
}

/// Outcome of a whole batch, one entry per requested name, in request order.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchReport {
    /// Names that were staged, in request order. This is the working set for later stages.
    pub fn succeeded(&self) -> Vec<ImageName> {
        self.outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.name.clone())
            .collect()
    }

    pub fn summary(&self) -> FetchSummary {
        let mut summary = FetchSummary { requested: self.outcomes.len() as u32, ..Default::default() };
        for outcome in &self.outcomes {
            if outcome.success {
                summary.succeeded += 1;
                if outcome.cached {
                    summary.cached += 1;
                }
            } else {
                summary.failed += 1;
            }
        }
        summary
    }
}

/// Fetches image batches through the content cache.
#[derive(Clone)]
pub struct Fetcher {
    cache: ContentCache,
    source: Arc<dyn ImageSource>,
    staging_root: PathBuf,
    concurrency: usize,
}

impl Fetcher {
    pub fn new(
        cache: ContentCache, source: Arc<dyn ImageSource>, staging_root: impl Into<PathBuf>, concurrency: usize,
    ) -> Self {
        Self { cache, source, staging_root: staging_root.into(), concurrency: concurrency.max(1) }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Create a fresh staging directory for one request.
    pub async fn create_staging(&self) -> Result<StagingArea, Error> {
        let path = self.staging_root.join(uuid::Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;
        Ok(StagingArea::new(path))
    }

    /// Stage every name in `names`, from the cache when possible.
    ///
    /// Per-image failures are recorded in the report and never abort the batch. The report has one
    /// outcome per entry of `names`; a repeated name is fetched once and its outcome copied to every
    /// position. Fails only if the staging directory is unusable or the worker pool cannot be
    /// started.
    pub async fn fetch_all(
        &self, names: &[ImageName], category: ImageCategory, staging: &StagingArea,
    ) -> Result<FetchReport, Error> {
        tokio::fs::create_dir_all(staging.path())
            .await
            .map_err(|e| Error::io(staging.path(), e))?;

        // Each position points at the slot of its first occurrence in `unique`.
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        let mut unique: Vec<ImageName> = Vec::new();
        let slots: Vec<usize> = names
            .iter()
            .map(|name| {
                *first_seen.entry(name.as_str()).or_insert_with(|| {
                    unique.push(name.clone());
                    unique.len() - 1
                })
            })
            .collect();

        tracing::info!(
            requested = names.len(),
            distinct = unique.len(),
            category = %category,
            concurrency = self.concurrency,
            "fetching images"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for (idx, name) in unique.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::WorkerPool(e.to_string()))?;
            let cache = self.cache.clone();
            let source = self.source.clone();
            let dir = staging.path().to_path_buf();
            let name = name.clone();

            join_set.spawn(async move {
                // NOTE: Hold permit for task duration to enforce concurrency limit
                let _permit = permit;
                let result = fetch_one(&cache, source.as_ref(), &name, category, &dir).await;
                (idx, result)
            });
        }

        let mut fetched: Vec<FetchOutcome> = unique
            .iter()
            .map(|name| FetchOutcome::failed(name.clone(), "fetch task did not complete"))
            .collect();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, Ok(cached))) => {
                    fetched[idx] = FetchOutcome::succeeded(unique[idx].clone(), cached);
                }
                Ok((idx, Err(e))) => {
                    tracing::warn!(image = %unique[idx], error = %e, "image fetch failed");
                    fetched[idx] = FetchOutcome::failed(unique[idx].clone(), e.to_string());
                }
                Err(e) => tracing::warn!(error = %e, "image fetch task aborted"),
            }
        }

        let outcomes = slots.iter().map(|&slot| fetched[slot].clone()).collect();
        let report = FetchReport { outcomes };
        let summary = report.summary();
        tracing::info!(
            requested = summary.requested,
            succeeded = summary.succeeded,
            cached = summary.cached,
            failed = summary.failed,
            "fetched {} images out of {} requested",
            summary.succeeded,
            summary.requested
        );

        Ok(report)
    }

    /// Move staged images into the content cache and remove the staging directory.
    pub async fn promote(&self, staging: &StagingArea) -> Result<usize, Error> {
        let promoted = self.cache.promote_dir(staging.path()).await?;
        tracing::debug!(promoted, path = %staging.path().display(), "staging promoted into cache");
        Ok(promoted)
    }
}

/// Stage one image. Returns whether it came from the cache.
async fn fetch_one(
    cache: &ContentCache, source: &dyn ImageSource, name: &str, category: ImageCategory, dir: &Path,
) -> Result<bool, Error> {
    validate_image_name(name)?;
    let dest = dir.join(name);

    if cache.copy_to(name, &dest).await? {
        tracing::debug!(image = %name, "cached image available");
        return Ok(true);
    }

    let bytes = source.fetch_image(name, category, &dest).await?;
    tracing::debug!(image = %name, bytes, "downloaded");
    Ok(false)
}
