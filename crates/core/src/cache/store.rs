//! Cache directory handle and entry operations.
//!
//! Entries are plain files named by [`compute_cache_key`]. There is no index: the directory is
//! the cache, and the filesystem provides all the isolation concurrent workers need.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use walkdir::WalkDir;

use super::hash::{compute_cache_key, is_cache_key};
use crate::Error;
use crate::model::validate_image_name;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Summary of the cache directory contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
}

/// Process-wide image cache.
///
/// Cheap to clone; every clone points at the same directory.
#[derive(Clone, Debug)]
pub struct ContentCache {
    root: Arc<PathBuf>,
    max_bytes: u64,
}

impl ContentCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    ///
    /// If the cache already holds more than `max_bytes`, it is cleared before anything is read.
    pub async fn open(root: impl AsRef<Path>, max_bytes: u64) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::io(&root, e))?;

        let cache = Self { root: Arc::new(root), max_bytes };
        cache.enforce_ceiling().await?;
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Path of the entry for `name`, whether or not it exists.
    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.root.join(compute_cache_key(name))
    }

    pub async fn contains(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.entry_path(name)).await.unwrap_or(false)
    }

    /// Read the cached bytes for `name`.
    pub async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, Error> {
        let path = self.entry_path(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Store `bytes` under `name`, replacing any previous entry.
    pub async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), Error> {
        let tmp = self.tmp_path(name);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Error::io(&tmp, e))?;
        self.commit(&tmp, name).await
    }

    /// Copy the entry for `name` to `dest`.
    ///
    /// Returns `Ok(false)` on a cache miss.
    pub async fn copy_to(&self, name: &str, dest: &Path) -> Result<bool, Error> {
        let path = self.entry_path(name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }
        tokio::fs::copy(&path, dest)
            .await
            .map_err(|e| Error::io(dest, e))?;
        Ok(true)
    }

    /// Move the file at `src` into the cache under `name`.
    ///
    /// Falls back to copy-and-delete when `src` lives on another filesystem.
    pub async fn insert_file(&self, name: &str, src: &Path) -> Result<(), Error> {
        let dest = self.entry_path(name);
        if tokio::fs::rename(src, &dest).await.is_ok() {
            return Ok(());
        }

        let tmp = self.tmp_path(name);
        tokio::fs::copy(src, &tmp)
            .await
            .map_err(|e| Error::io(src, e))?;
        self.commit(&tmp, name).await?;
        if let Err(e) = tokio::fs::remove_file(src).await {
            tracing::debug!(path = %src.display(), error = %e, "failed to remove promoted file");
        }
        Ok(())
    }

    /// Move every file of a staging directory into the cache, then delete the directory.
    ///
    /// Idempotent: a missing or empty directory is a no-op. Hidden files (partial downloads) are
    /// discarded. Individual files that fail to move are logged and skipped. Returns the number of promoted entries.
    pub async fn promote_dir(&self, staging: &Path) -> Result<usize, Error> {
        let mut dir = match tokio::fs::read_dir(staging).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %staging.display(), "staging directory already gone, nothing to promote");
                return Ok(0);
            }
            Err(e) => return Err(Error::io(staging, e)),
        };

        let mut promoted = 0usize;
        while let Some(entry) = dir.next_entry().await.map_err(|e| Error::io(staging, e))? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file || validate_image_name(&name).is_err() {
                continue;
            }
            match self.insert_file(&name, &path).await {
                Ok(()) => promoted += 1,
                Err(e) => tracing::warn!(image = %name, error = %e, "failed to move image into cache"),
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(staging).await
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
        }

        Ok(promoted)
    }

    /// Total size of every file under the cache directory.
    pub async fn total_size_bytes(&self) -> Result<u64, Error> {
        Ok(self.stats().await?.total_bytes)
    }

    /// Entry count and total size.
    pub async fn stats(&self) -> Result<CacheStats, Error> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk_stats(&root))
            .await
            .map_err(|e| Error::Cache(format!("size scan aborted: {e}")))?
    }

    /// Delete every entry.
    pub async fn clear(&self) -> Result<(), Error> {
        match tokio::fs::remove_dir_all(self.root.as_path()).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(self.root.as_path(), e)),
        }
        tokio::fs::create_dir_all(self.root.as_path())
            .await
            .map_err(|e| Error::io(self.root.as_path(), e))
    }

    /// Clear the cache if it exceeds its ceiling. Returns whether a clear happened.
    pub async fn enforce_ceiling(&self) -> Result<bool, Error> {
        let stats = self.stats().await?;
        if stats.total_bytes <= self.max_bytes {
            tracing::debug!(entries = stats.entries, total_bytes = stats.total_bytes, "cache within ceiling");
            return Ok(false);
        }

        tracing::info!(
            entries = stats.entries,
            total_bytes = stats.total_bytes,
            max_bytes = self.max_bytes,
            "cache exceeds ceiling, clearing"
        );
        self.clear().await?;
        Ok(true)
    }

    fn tmp_path(&self, name: &str) -> PathBuf {
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{}.{}.{seq}.tmp", compute_cache_key(name), std::process::id()))
    }

    async fn commit(&self, tmp: &Path, name: &str) -> Result<(), Error> {
        let dest = self.entry_path(name);
        if let Err(e) = tokio::fs::rename(tmp, &dest).await {
            let _ = tokio::fs::remove_file(tmp).await;
            return Err(Error::io(dest, e));
        }
        Ok(())
    }
}

fn walk_stats(root: &Path) -> Result<CacheStats, Error> {
    let mut stats = CacheStats::default();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            // Entries may vanish under concurrent promotion or clearing.
            Err(e) if e.io_error().is_some_and(|io| io.kind() == ErrorKind::NotFound) => continue,
            Err(e) => return Err(Error::Cache(format!("failed to scan {}: {e}", root.display()))),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            stats.total_bytes += meta.len();
            if entry.file_name().to_str().is_some_and(is_cache_key) {
                stats.entries += 1;
            }
        }
    }
    Ok(stats)
}
