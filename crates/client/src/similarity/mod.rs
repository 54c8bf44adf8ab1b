//! Near-duplicate detection over a directory of staged images.
//!
//! The pipeline only depends on [`SimilarityBackend`]; [`PerceptualBackend`] is the in-process
//! implementation shipped with the server.
//!
//! ### Modes
//! - `phash`: 64-bit DCT mean hash, duplicates when Hamming distance <= `round((1 - t) * 64)`.
//! - `cnn`: small colour embedding, duplicates when cosine similarity >= `t`.
//!
//! Files that cannot be decoded are logged and left out. Hidden files (partial downloads) are
//! never considered.

pub mod embedding;
pub mod phash;

use std::path::Path;

use image::{DynamicImage, ImageReader};
use imgdup_core::{DetectionMode, DuplicateRelation, Error, ImageName};
use rayon::prelude::*;

/// Pluggable near-duplicate detector.
///
/// Implementations are synchronous and CPU bound; callers run them off the async runtime.
pub trait SimilarityBackend: Send + Sync {
    /// Compare every image in `dir` and report, per image, the others it nearly duplicates.
    fn detect(&self, dir: &Path, mode: DetectionMode, threshold: f64) -> Result<DuplicateRelation, Error>;
}

/// One decoded image from the staging directory.
pub struct LoadedImage {
    pub name: ImageName,
    pub image: DynamicImage,
}

/// Default backend: perceptual hashes for logos, embeddings for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualBackend;

impl PerceptualBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SimilarityBackend for PerceptualBackend {
    fn detect(&self, dir: &Path, mode: DetectionMode, threshold: f64) -> Result<DuplicateRelation, Error> {
        let images = load_dir(dir)?;
        tracing::debug!(images = images.len(), mode = mode.as_str(), threshold, "comparing images");

        let relation = match mode {
            DetectionMode::Phash => phash::detect(&images, threshold),
            DetectionMode::Cnn => embedding::detect(&images, threshold),
        };
        Ok(relation)
    }
}

/// Decode every visible regular file in `dir`, sorted by name.
pub fn load_dir(dir: &Path) -> Result<Vec<LoadedImage>, Error> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            candidates.push((name, entry.path()));
        }
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    let decoded: Vec<Option<LoadedImage>> = candidates
        .par_iter()
        .map(|(name, path)| match decode(path) {
            Ok(image) => Some(LoadedImage { name: name.clone(), image }),
            Err(e) => {
                tracing::warn!(image = %name, error = %e, "skipping undecodable image");
                None
            }
        })
        .collect();

    Ok(decoded.into_iter().flatten().collect())
}

fn decode(path: &Path) -> Result<DynamicImage, Error> {
    ImageReader::open(path)
        .map_err(|e| Error::io(path, e))?
        .with_guessed_format()
        .map_err(|e| Error::io(path, e))?
        .decode()
        .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))
}

/// Build the relation from a pairwise predicate over `images`, keyed in image order.
pub(crate) fn relation_from_pairs<F>(images: &[LoadedImage], is_duplicate: F) -> DuplicateRelation
where
    F: Fn(usize, usize) -> bool + Sync,
{
    let rows: Vec<Vec<ImageName>> = (0..images.len())
        .into_par_iter()
        .map(|i| {
            (0..images.len())
                .filter(|&j| j != i && is_duplicate(i, j))
                .map(|j| images[j].name.clone())
                .collect()
        })
        .collect();

    images.iter().map(|img| img.name.clone()).zip(rows).collect()
}
