//! Unified error types for imgdup.
//!
//! Every variant is recoverable at the request level: callers decide whether a failure drops one
//! image, empties the duplicate relation, or aborts the current request.

use std::path::PathBuf;

/// Unified error type shared by the cache, fetcher and similarity backends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid request payload (unknown category, empty image list, ...).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Image name is not a single safe path segment.
    #[error("INVALID_IMAGE_NAME: {0:?}")]
    InvalidImageName(String),

    /// Filesystem operation failed.
    #[error("IO_ERROR: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache bookkeeping failed (walk, clear, promote).
    #[error("CACHE_ERROR: {0}")]
    Cache(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response or transport failure.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Image could not be decoded.
    #[error("DECODE_ERROR: {0}")]
    Decode(String),

    /// Concurrent fetch workers could not be started.
    #[error("WORKER_POOL: {0}")]
    WorkerPool(String),

    /// Similarity backend failed.
    #[error("BACKEND_ERROR: {0}")]
    Backend(String),
}

impl Error {
    /// Wrap an `std::io::Error` with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
