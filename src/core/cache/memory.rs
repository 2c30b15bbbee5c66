//! In-memory fingerprint cache.

use super::CacheStats;
use crate::core::hasher::{Fingerprint, SchemeTag};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Per-URL fingerprint cache.
///
/// Keyed by scheme tag as well as URL so engines with different settings
/// can share one cache without handing each other incomparable values.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: RwLock<HashMap<(SchemeTag, String), Fingerprint>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FingerprintCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fingerprint, counting the hit or miss
    pub fn get(&self, tag: SchemeTag, source_url: &str) -> Option<Fingerprint> {
        let found = self
            .read()
            .get(&(tag, source_url.to_string()))
            .cloned();

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store a fingerprint for a URL
    pub fn insert(&self, source_url: &str, fingerprint: Fingerprint) {
        let Some(tag) = fingerprint.tag() else {
            return;
        };
        self.write().insert((tag, source_url.to_string()), fingerprint);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    // A panic while holding the lock cannot leave a half-written
    // fingerprint behind, so a poisoned map is still usable
    fn read(&self) -> RwLockReadGuard<'_, HashMap<(SchemeTag, String), Fingerprint>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(SchemeTag, String), Fingerprint>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::HashScheme;

    fn dct8() -> SchemeTag {
        SchemeTag::new(HashScheme::Dct, 8)
    }

    fn fingerprint(hex: &str) -> Fingerprint {
        Fingerprint::parse(&format!("dct8:{hex}")).unwrap()
    }

    #[test]
    fn cache_miss_returns_none() {
        let cache = FingerprintCache::new();
        assert!(cache.get(dct8(), "https://x.test/a.png").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn cache_hit_returns_entry() {
        let cache = FingerprintCache::new();
        cache.insert("https://x.test/a.png", fingerprint("0123456789abcdef"));

        let hit = cache.get(dct8(), "https://x.test/a.png").unwrap();

        assert_eq!(hit.hex(), "0123456789abcdef");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn other_scheme_does_not_hit() {
        let cache = FingerprintCache::new();
        cache.insert("https://x.test/a.png", fingerprint("0123456789abcdef"));

        let mean8 = SchemeTag::new(HashScheme::Mean, 8);
        assert!(cache.get(mean8, "https://x.test/a.png").is_none());
    }

    #[test]
    fn untagged_fingerprints_are_not_cached() {
        let cache = FingerprintCache::new();
        cache.insert("https://x.test/a.png", Fingerprint::parse("ffff").unwrap());

        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = FingerprintCache::new();
        cache.insert("https://x.test/a.png", fingerprint("0000000000000001"));
        cache.insert("https://x.test/b.png", fingerprint("0000000000000002"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
