//! Core types and shared functionality for imgdup.
//!
//! This crate provides:
//! - Disk-backed content cache for fetched images
//! - Duplicate grouping (connected components over the similarity relation)
//! - Request data model and WebSocket message types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod cluster;
pub mod config;
pub mod error;
pub mod model;
pub mod protocol;

pub use cache::{CacheStats, ContentCache};
pub use cluster::{ClusterResult, DuplicateGroup, DuplicateRelation, build_groups};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use model::{DEFAULT_THRESHOLD, DetectionMode, ImageCategory, ImageName, Resolution};
pub use protocol::{Inbound, InboundEnvelope, OutboundMessage};
