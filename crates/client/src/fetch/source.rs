//! Where cache misses are fetched from.

use std::path::Path;

use imgdup_core::{Error, ImageCategory};

use super::{FetchClient, image_url};

/// Remote origin for images that are not cached yet.
///
/// Keeps the fetcher independent of HTTP so batches can run against any origin.
#[async_trait::async_trait]
pub trait ImageSource: Send + Sync {
    /// Download `name` at the resolution chosen for `category` into `dest`.
    ///
    /// Returns the number of bytes written. On error `dest` must not exist.
    async fn fetch_image(&self, name: &str, category: ImageCategory, dest: &Path) -> Result<u64, Error>;
}

#[async_trait::async_trait]
impl ImageSource for FetchClient {
    async fn fetch_image(&self, name: &str, category: ImageCategory, dest: &Path) -> Result<u64, Error> {
        let url = image_url(self.base(), category.resolution(), name).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        self.download(&url, dest).await
    }
}
