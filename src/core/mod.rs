//! # Core Module
//!
//! The UI-agnostic engine.
//!
//! ## Modules
//! - `hasher` - Computes perceptual fingerprints of media
//! - `comparator` - Distances between fingerprints
//! - `cache` - Remembers fingerprints per source URL
//! - `store` - Persists saved records
//! - `resolver` - Decides whether a fingerprint is already saved
//! - `pool` - Keeps pool indices unique
//! - `tags` - Tag categories and suggestions
//! - `pipeline` - Orchestrates a save end to end

pub mod cache;
pub mod comparator;
pub(crate) mod deadline;
pub mod hasher;
pub mod pipeline;
pub mod pool;
pub mod resolver;
pub mod store;
pub mod tags;

// Re-export commonly used types
pub use comparator::{MatchResult, MatchType};
pub use hasher::{Fingerprint, HashScheme, MediaRef};
pub use pipeline::{SaveOutcome, SavePipeline, SaveRequest};
pub use resolver::{DuplicateResolver, SimilarityVerdict};
pub use store::{ImageRecord, NewRecord, RecordStore};
