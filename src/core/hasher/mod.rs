//! # Hasher Module
//!
//! Turns a media item into a perceptual [`Fingerprint`].
//!
//! ## Supported Schemes
//! - **DCT hash** (`dct8`) - Low-frequency DCT signs, robust to resizing and
//!   recompression. The default.
//! - **Mean hash** (`mean8`) - Pixels against their average. Kept to match
//!   fingerprints written by older versions.
//!
//! ## How It Works
//! 1. Pick a still frame (first frame for stills, the frame at the seek
//!    offset for animations and videos)
//! 2. Flatten transparency onto a fixed background
//! 3. Downscale and hash
//! 4. Serialize as `<scheme><block>:<hex>`
//!
//! Extraction and hashing run under a wall-clock budget. Running out of it
//! yields [`FingerprintError::Timeout`], never a fingerprint.
//!
//! ## Example
//! ```rust,ignore
//! use tagsaver_core::core::hasher::{HasherConfig, HashScheme, MediaRef};
//!
//! let engine = HasherConfig::new()
//!     .scheme(HashScheme::Dct)
//!     .block_size(8)
//!     .build();
//!
//! let fingerprint = engine.compute_fingerprint(&MediaRef::from_path("cat.png"))?;
//! ```

mod algorithms;
pub mod fast_decode;
pub mod fast_resize;
mod fingerprint;
mod media;
mod traits;

pub use algorithms::{DctHasher, MeanHasher};
pub use fingerprint::Fingerprint;
pub use media::{FrameExtractor, MediaData, MediaKind, MediaRef};
pub use traits::{HashAlgorithm, HashScheme, SchemeTag, MAX_BLOCK_SIZE};

use crate::core::cache::FingerprintCache;
use crate::core::deadline::{run_with_timeout, DeadlineError};
use crate::error::FingerprintError;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration builder for the hash engine
#[derive(Debug, Clone)]
pub struct HasherConfig {
    scheme: HashScheme,
    /// Side of the downscaled grid (DCT only)
    grid_size: u32,
    /// Side of the retained block; fingerprint length follows from it
    block_size: u32,
    background: [u8; 3],
    frame_offset: Duration,
    timeout: Duration,
    ffmpeg: PathBuf,
}

impl HasherConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            scheme: HashScheme::Dct,
            grid_size: 32,
            block_size: 8,
            background: [255, 255, 255],
            frame_offset: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    pub fn scheme(mut self, scheme: HashScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the downscale grid side.
    ///
    /// Ignored by the mean scheme, which downscales straight to the block.
    pub fn grid_size(mut self, size: u32) -> Self {
        self.grid_size = size;
        self
    }

    /// Set the retained block side.
    /// - 8: 63 bits (DCT) or 64 bits (mean), the default
    /// - 16: 255 or 256 bits, stricter but slower to compare
    pub fn block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    /// Colour transparent pixels are flattened onto
    pub fn background(mut self, rgb: [u8; 3]) -> Self {
        self.background = rgb;
        self
    }

    /// Seek position for animations and videos
    pub fn frame_offset(mut self, offset: Duration) -> Self {
        self.frame_offset = offset;
        self
    }

    /// Wall-clock budget for one fingerprint
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path or name of the ffmpeg executable used for videos
    pub fn ffmpeg(mut self, program: impl Into<PathBuf>) -> Self {
        self.ffmpeg = program.into();
        self
    }

    /// Build only the hashing algorithm
    pub fn build_algorithm(&self) -> Arc<dyn HashAlgorithm> {
        match self.scheme {
            HashScheme::Dct => Arc::new(
                DctHasher::new(self.grid_size, self.block_size).with_background(self.background),
            ),
            HashScheme::Mean => {
                Arc::new(MeanHasher::new(self.block_size).with_background(self.background))
            }
        }
    }

    /// Build an engine with a private cache
    pub fn build(self) -> HashEngine {
        self.build_with_cache(Arc::new(FingerprintCache::new()))
    }

    /// Build an engine sharing `cache` with other components
    pub fn build_with_cache(self, cache: Arc<FingerprintCache>) -> HashEngine {
        let algorithm = self.build_algorithm();
        let extractor = FrameExtractor::new(self.frame_offset, self.ffmpeg, self.timeout);
        HashEngine {
            algorithm,
            extractor,
            timeout: self.timeout,
            cache,
        }
    }
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes fingerprints for media, with caching and a time budget
#[derive(Clone)]
pub struct HashEngine {
    algorithm: Arc<dyn HashAlgorithm>,
    extractor: FrameExtractor,
    timeout: Duration,
    cache: Arc<FingerprintCache>,
}

impl HashEngine {
    /// Fingerprint a media item.
    ///
    /// Deterministic for identical bytes and configuration. Cached per
    /// source URL and scheme; failures are not cached.
    pub fn compute_fingerprint(&self, media: &MediaRef) -> Result<Fingerprint, FingerprintError> {
        let url = media.source_url().to_string();
        let tag = self.algorithm.tag();

        if let Some(cached) = self.cache.get(tag, &url) {
            debug!(url = %url, "fingerprint cache hit");
            return Ok(cached);
        }

        let started = Instant::now();
        let algorithm = Arc::clone(&self.algorithm);
        let extractor = self.extractor.clone();
        let owned = media.clone();

        let outcome = run_with_timeout("tagsaver-hash", self.timeout, move || {
            let frame = extractor.extract(&owned)?;
            algorithm.hash_image(&frame)
        });

        let fingerprint = match outcome {
            Ok(result) => result.map_err(|e| e.with_source(&url)),
            Err(DeadlineError::Elapsed) => Err(FingerprintError::Timeout {
                source_url: url.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            Err(DeadlineError::Abandoned) => Err(FingerprintError::Decode {
                source_url: url.clone(),
                reason: "hashing worker stopped before producing a result".to_string(),
            }),
        };

        match &fingerprint {
            Ok(value) => {
                debug!(
                    url = %url,
                    fingerprint = %value,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "computed fingerprint"
                );
                self.cache.insert(&url, value.clone());
            }
            Err(e) => warn!(url = %url, error = %e, "fingerprint unavailable"),
        }

        fingerprint
    }

    /// Hash an already decoded image, bypassing extraction and the cache
    pub fn hash_image(&self, image: &DynamicImage) -> Result<Fingerprint, FingerprintError> {
        self.algorithm.hash_image(image)
    }

    /// Scheme and block size this engine produces
    pub fn tag(&self) -> SchemeTag {
        self.algorithm.tag()
    }

    pub fn cache(&self) -> &Arc<FingerprintCache> {
        &self.cache
    }
}

impl std::fmt::Debug for HashEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashEngine")
            .field("tag", &self.algorithm.tag())
            .field("timeout", &self.timeout)
            .finish()
    }
}
