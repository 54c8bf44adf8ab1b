//! Clustering request coordinator.
//!
//! Drives one request through `Received -> Fetching -> Detecting -> Grouping -> Delivered`, with
//! `Failed` reachable from any stage. Only an unusable staging directory or a closed outbound queue
//! fail a request; fetch and backend failures degrade the result instead.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use imgdup_client::{Fetcher, SimilarityBackend, StagingArea};
use imgdup_core::{ClusterResult, DetectionMode, DuplicateRelation, ImageCategory, ImageName, OutboundMessage, build_groups};

use crate::error::PipelineError;
use crate::outbound::Outbound;

pub const FETCHING_TOAST: &str = "Fetching images...";
pub const DETECTING_TOAST: &str = "Identifying duplicates...";

/// Request lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Fetching,
    Detecting,
    Grouping,
    Delivered,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Detecting => "detecting",
            PipelineStage::Grouping => "grouping",
            PipelineStage::Delivered => "delivered",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A validated clustering request.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateRequest {
    pub images: Vec<ImageName>,
    pub category: ImageCategory,
    pub threshold: f64,
}

/// Final state of one request.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub stage: PipelineStage,
    /// Delivered result, if the request got that far.
    pub result: Option<ClusterResult>,
}

/// Shared coordinator; one instance serves every connection.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Fetcher,
    backend: Arc<dyn SimilarityBackend>,
    detect_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, backend: Arc<dyn SimilarityBackend>, detect_timeout: Option<Duration>) -> Self {
        Self { fetcher, backend, detect_timeout }
    }

    /// Run `request` to completion, pushing progress and the result through `outbound`.
    ///
    /// Staged images are promoted into the cache whatever the outcome.
    pub async fn run(&self, request: DuplicateRequest, outbound: &Outbound) -> PipelineOutcome {
        let start = Instant::now();
        let mut stage = PipelineStage::Received;

        let staging = match self.fetcher.create_staging().await {
            Ok(staging) => staging,
            Err(e) => {
                tracing::error!(stage = %stage, error = %e, "failed to create staging area");
                return PipelineOutcome { stage: PipelineStage::Failed, result: None };
            }
        };

        let outcome = match self.process(&request, &staging, outbound, &mut stage).await {
            Ok(result) => {
                tracing::info!(
                    images = request.images.len(),
                    groups = result.duplicate_images_grouped.len(),
                    duplicate_groups = result.duplicate_group_count(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "duplicate search delivered"
                );
                PipelineOutcome { stage: PipelineStage::Delivered, result: Some(result) }
            }
            Err(e) => {
                tracing::error!(stage = %stage, error = %e, "duplicate search failed");
                PipelineOutcome { stage: PipelineStage::Failed, result: None }
            }
        };

        if let Err(e) = self.fetcher.promote(&staging).await {
            tracing::warn!(path = %staging.path().display(), error = %e, "failed to promote staged images");
        }

        outcome
    }

    async fn process(
        &self, request: &DuplicateRequest, staging: &StagingArea, outbound: &Outbound, stage: &mut PipelineStage,
    ) -> Result<ClusterResult, PipelineError> {
        advance(stage, PipelineStage::Fetching);
        outbound.toast(FETCHING_TOAST).await?;
        let report = self
            .fetcher
            .fetch_all(&request.images, request.category, staging)
            .await
            .map_err(PipelineError::Staging)?;
        let working_set = report.succeeded();

        advance(stage, PipelineStage::Detecting);
        outbound.toast(DETECTING_TOAST).await?;
        let relation = if working_set.is_empty() {
            DuplicateRelation::new()
        } else {
            self.detect(staging.path().to_path_buf(), request.category.detection_mode(), request.threshold)
                .await
        };

        advance(stage, PipelineStage::Grouping);
        let groups = build_groups(&relation.ordered_by(&working_set));
        let result = ClusterResult::from_groups(groups);

        outbound
            .send(OutboundMessage::FindDuplicateImagesResult(result.clone()))
            .await?;
        advance(stage, PipelineStage::Delivered);

        Ok(result)
    }

    /// Run the backend on the blocking pool. Any failure yields an empty relation.
    async fn detect(&self, dir: PathBuf, mode: DetectionMode, threshold: f64) -> DuplicateRelation {
        let backend = self.backend.clone();
        let task = tokio::task::spawn_blocking(move || backend.detect(&dir, mode, threshold));

        let joined = match self.detect_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // A blocking task cannot be cancelled: the backend keeps running on the blocking
                    // pool and may still be reading staged files while they are promoted.
                    tracing::warn!(timeout_ms = limit.as_millis() as u64, "similarity backend timed out");
                    tracing::debug!(mode = mode.as_str(), "abandoned detection left running on the blocking pool");
                    return DuplicateRelation::new();
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(relation)) => relation,
            Ok(Err(e)) => {
                tracing::warn!(mode = mode.as_str(), error = %e, "similarity backend failed");
                DuplicateRelation::new()
            }
            Err(e) => {
                tracing::warn!(mode = mode.as_str(), error = %e, "similarity backend panicked");
                DuplicateRelation::new()
            }
        }
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    tracing::debug!(from = %stage, to = %next, "pipeline stage");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgdup_client::ImageSource;
    use imgdup_core::{ContentCache, Error};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct FakeSource {
        missing: HashSet<String>,
    }

    #[async_trait::async_trait]
    impl ImageSource for FakeSource {
        async fn fetch_image(&self, name: &str, _category: ImageCategory, dest: &Path) -> Result<u64, Error> {
            if self.missing.contains(name) {
                return Err(Error::HttpError("status 404".into()));
            }
            tokio::fs::write(dest, name.as_bytes()).await.map_err(|e| Error::io(dest, e))?;
            Ok(name.len() as u64)
        }
    }

    enum Behaviour {
        Relation(Vec<(&'static str, Vec<&'static str>)>),
        Fail,
        Panic,
        Sleep(Duration),
    }

    struct FakeBackend {
        behaviour: Behaviour,
        calls: Mutex<Vec<(Vec<String>, DetectionMode, f64)>>,
    }

    impl FakeBackend {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self { behaviour, calls: Mutex::new(Vec::new()) })
        }
    }

    impl SimilarityBackend for FakeBackend {
        fn detect(&self, dir: &Path, mode: DetectionMode, threshold: f64) -> Result<DuplicateRelation, Error> {
            let mut files: Vec<String> = std::fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            files.sort();
            self.calls.lock().unwrap().push((files, mode, threshold));

            match &self.behaviour {
                Behaviour::Relation(entries) => Ok(entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                    .collect()),
                Behaviour::Fail => Err(Error::Backend("model unavailable".into())),
                Behaviour::Panic => panic!("backend crashed"),
                Behaviour::Sleep(d) => {
                    std::thread::sleep(*d);
                    Ok(DuplicateRelation::new())
                }
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        pipeline: Pipeline,
        backend: Arc<FakeBackend>,
        cache: ContentCache,
    }

    async fn fixture(behaviour: Behaviour, missing: &[&str], detect_timeout: Option<Duration>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::open(dir.path().join("cache"), 1024 * 1024).await.unwrap();
        let source = Arc::new(FakeSource { missing: missing.iter().map(|s| s.to_string()).collect() });
        let fetcher = Fetcher::new(cache.clone(), source, dir.path().join("staging"), 4);
        let backend = FakeBackend::new(behaviour);
        let pipeline = Pipeline::new(fetcher, backend.clone(), detect_timeout);
        Fixture { dir, pipeline, backend, cache }
    }

    fn request(images: &[&str], category: ImageCategory) -> DuplicateRequest {
        DuplicateRequest { images: images.iter().map(|s| s.to_string()).collect(), category, threshold: 0.85 }
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn groups(result: &ClusterResult) -> Vec<Vec<&str>> {
        result
            .duplicate_images_grouped
            .iter()
            .map(|g| g.iter().map(String::as_str).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_delivers_toasts_then_result() {
        let fx = fixture(Behaviour::Relation(vec![("a.jpg", vec!["c.jpg"])]), &[], None).await;
        let (outbound, mut rx) = Outbound::channel();

        let outcome = fx
            .pipeline
            .run(request(&["a.jpg", "b.jpg", "c.jpg"], ImageCategory::Poster), &outbound)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Delivered);
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], OutboundMessage::toast(FETCHING_TOAST));
        assert_eq!(messages[1], OutboundMessage::toast(DETECTING_TOAST));
        let OutboundMessage::FindDuplicateImagesResult(result) = &messages[2] else {
            panic!("expected result, got {:?}", messages[2]);
        };
        assert_eq!(groups(result), vec![vec!["a.jpg", "c.jpg"], vec!["b.jpg"]]);
        assert_eq!(result.duplicate_images, vec!["a.jpg".to_string(), "c.jpg".to_string()]);
        assert_eq!(Some(result), outcome.result.as_ref());
    }

    #[tokio::test]
    async fn test_backend_sees_staged_files_and_category_mode() {
        let fx = fixture(Behaviour::Relation(vec![]), &[], None).await;
        let (outbound, _rx) = Outbound::channel();
        let mut req = request(&["x.png", "y.png"], ImageCategory::Logo);
        req.threshold = 0.9;

        fx.pipeline.run(req, &outbound).await;

        let calls = fx.backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec!["x.png".to_string(), "y.png".to_string()]);
        assert_eq!(calls[0].1, DetectionMode::Phash);
        assert!((calls[0].2 - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_backend_failure_gives_singletons() {
        for behaviour in [Behaviour::Fail, Behaviour::Panic] {
            let fx = fixture(behaviour, &[], None).await;
            let (outbound, _rx) = Outbound::channel();

            let outcome = fx
                .pipeline
                .run(request(&["a.jpg", "b.jpg", "c.jpg"], ImageCategory::Backdrop), &outbound)
                .await;

            assert_eq!(outcome.stage, PipelineStage::Delivered);
            let result = outcome.result.unwrap();
            assert_eq!(groups(&result), vec![vec!["a.jpg"], vec!["b.jpg"], vec!["c.jpg"]]);
            assert!(result.duplicate_images.is_empty());
        }
    }

    #[tokio::test]
    async fn test_backend_timeout_gives_singletons() {
        let fx = fixture(Behaviour::Sleep(Duration::from_millis(500)), &[], Some(Duration::from_millis(20))).await;
        let (outbound, _rx) = Outbound::channel();

        let started = std::time::Instant::now();
        let outcome = fx
            .pipeline
            .run(request(&["a.jpg", "b.jpg"], ImageCategory::Poster), &outbound)
            .await;

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(outcome.stage, PipelineStage::Delivered);
        assert_eq!(groups(&outcome.result.unwrap()), vec![vec!["a.jpg"], vec!["b.jpg"]]);
        // Staging is promoted without waiting for the abandoned backend call.
        assert_eq!(fx.cache.get("a.jpg").await.unwrap(), Some(b"a.jpg".to_vec()));
        let leftovers = std::fs::read_dir(fx.dir.path().join("staging")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_repeated_names_group_once() {
        let fx = fixture(Behaviour::Relation(vec![("a.jpg", vec!["c.jpg"])]), &[], None).await;
        let (outbound, _rx) = Outbound::channel();

        let outcome = fx
            .pipeline
            .run(request(&["a.jpg", "b.jpg", "a.jpg", "c.jpg"], ImageCategory::Poster), &outbound)
            .await;

        let result = outcome.result.unwrap();
        assert_eq!(groups(&result), vec![vec!["a.jpg", "c.jpg"], vec!["b.jpg"]]);
        let calls = fx.backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, vec!["a.jpg".to_string(), "b.jpg".to_string(), "c.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_failures_shrink_working_set() {
        let relation = vec![("a.jpg", vec!["b.jpg"]), ("b.jpg", vec!["a.jpg"]), ("c.jpg", vec![])];
        let fx = fixture(Behaviour::Relation(relation), &["b.jpg"], None).await;
        let (outbound, _rx) = Outbound::channel();

        let outcome = fx
            .pipeline
            .run(request(&["a.jpg", "b.jpg", "c.jpg"], ImageCategory::Profile), &outbound)
            .await;

        let result = outcome.result.unwrap();
        assert_eq!(groups(&result), vec![vec!["a.jpg"], vec!["c.jpg"]]);
        assert_eq!(result.sorted_images, vec!["a.jpg".to_string(), "c.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_all_fetches_fail_delivers_empty_result() {
        let fx = fixture(Behaviour::Relation(vec![]), &["a.jpg", "b.jpg"], None).await;
        let (outbound, mut rx) = Outbound::channel();

        let outcome = fx
            .pipeline
            .run(request(&["a.jpg", "b.jpg"], ImageCategory::Poster), &outbound)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Delivered);
        assert_eq!(outcome.result.unwrap(), ClusterResult::from_groups(vec![]));
        assert!(fx.backend.calls.lock().unwrap().is_empty());
        assert_eq!(drain(&mut rx).len(), 3);
    }

    #[tokio::test]
    async fn test_staged_images_promoted_and_staging_removed() {
        let fx = fixture(Behaviour::Relation(vec![]), &[], None).await;
        let (outbound, _rx) = Outbound::channel();

        fx.pipeline
            .run(request(&["a.jpg", "b.jpg"], ImageCategory::Poster), &outbound)
            .await;

        assert_eq!(fx.cache.get("a.jpg").await.unwrap(), Some(b"a.jpg".to_vec()));
        assert_eq!(fx.cache.get("b.jpg").await.unwrap(), Some(b"b.jpg".to_vec()));
        let leftovers = std::fs::read_dir(fx.dir.path().join("staging")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_closed_channel_fails_but_still_promotes() {
        let fx = fixture(Behaviour::Relation(vec![]), &[], None).await;
        let (outbound, rx) = Outbound::channel();
        drop(rx);

        let outcome = fx
            .pipeline
            .run(request(&["a.jpg"], ImageCategory::Poster), &outbound)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Failed);
        assert!(outcome.result.is_none());
        let leftovers = std::fs::read_dir(fx.dir.path().join("staging")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_unusable_staging_fails_without_messages() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("staging");
        std::fs::write(&blocker, b"file").unwrap();
        let cache = ContentCache::open(dir.path().join("cache"), 1024).await.unwrap();
        let source = Arc::new(FakeSource { missing: HashSet::new() });
        let fetcher = Fetcher::new(cache, source, &blocker, 2);
        let pipeline = Pipeline::new(fetcher, FakeBackend::new(Behaviour::Fail), None);
        let (outbound, mut rx) = Outbound::channel();

        let outcome = pipeline.run(request(&["a.jpg"], ImageCategory::Poster), &outbound).await;

        assert_eq!(outcome.stage, PipelineStage::Failed);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(PipelineStage::Detecting.to_string(), "detecting");
        assert_eq!(PipelineStage::Failed.to_string(), "failed");
    }
}
