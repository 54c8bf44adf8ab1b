//! Client code for imgdup.
//!
//! This crate provides the image fetch pipeline (CDN client, cache-aware batch fetcher) and the
//! similarity backends used by the server.

pub mod fetch;
pub mod similarity;

pub use fetch::{
    FetchClient, FetchConfig, FetchOutcome, FetchReport, FetchSummary, Fetcher, ImageSource, StagingArea,
};
pub use similarity::{PerceptualBackend, SimilarityBackend};
