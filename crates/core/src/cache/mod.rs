//! Disk-backed content cache for fetched images.
//!
//! This module provides a best-effort local accelerator in front of the image CDN:
//!
//! - Content-addressed file names derived from the image name (SHA-256)
//! - Atomic write-then-rename for every insert (last writer wins)
//! - Whole-cache eviction when the size ceiling is exceeded at open
//! - Promotion of a request's staging directory into the cache

pub mod hash;
pub mod store;

pub use crate::Error;

pub use store::{CacheStats, ContentCache};
