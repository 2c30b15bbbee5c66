//! # Cache Module
//!
//! Remembers fingerprints by source URL so a page revisited in the same
//! session is not decoded and hashed twice.
//!
//! The cache is an explicit object: build one per process or session and
//! hand it to every [`HashEngine`](crate::core::hasher::HashEngine) that
//! should share it. Only successful fingerprints are stored; an
//! unavailable result is retried next time.

mod memory;

pub use memory::FingerprintCache;

use serde::{Deserialize, Serialize};

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached fingerprints
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that had to hash
    pub misses: u64,
}
