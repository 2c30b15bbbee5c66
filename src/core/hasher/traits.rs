//! Trait definitions for content hashing.

use super::fingerprint::Fingerprint;
use crate::error::FingerprintError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest block side a fingerprint tag may carry
pub const MAX_BLOCK_SIZE: u32 = 32;

/// Available hashing schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashScheme {
    /// DCT-based hash: low-frequency block of a 2D cosine transform
    Dct,
    /// Legacy mean-threshold hash: one bit per downscaled pixel
    Mean,
}

impl HashScheme {
    /// Textual prefix used in fingerprint tags
    pub fn prefix(&self) -> &'static str {
        match self {
            HashScheme::Dct => "dct",
            HashScheme::Mean => "mean",
        }
    }

    /// Number of bits produced for a given block size
    pub fn bit_count(&self, block: u32) -> u32 {
        match self {
            // DC coefficient is dropped
            HashScheme::Dct => (block * block).saturating_sub(1),
            HashScheme::Mean => block * block,
        }
    }

    /// Get a human-readable description of the scheme
    pub fn description(&self) -> &'static str {
        match self {
            HashScheme::Dct => {
                "DCT hash - low-frequency cosine coefficients, tolerant of recompression and resizing"
            }
            HashScheme::Mean => {
                "Mean hash - legacy scheme comparing each pixel with the average brightness"
            }
        }
    }
}

impl fmt::Display for HashScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Version tag carried by every fingerprint this crate produces.
///
/// Two tagged fingerprints are only comparable when their tags are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemeTag {
    pub scheme: HashScheme,
    pub block: u32,
}

impl SchemeTag {
    pub fn new(scheme: HashScheme, block: u32) -> Self {
        Self { scheme, block }
    }

    pub fn bit_count(&self) -> u32 {
        self.scheme.bit_count(self.block)
    }
}

impl fmt::Display for SchemeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.scheme.prefix(), self.block)
    }
}

impl FromStr for SchemeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = if let Some(rest) = s.strip_prefix("dct") {
            (HashScheme::Dct, rest)
        } else if let Some(rest) = s.strip_prefix("mean") {
            (HashScheme::Mean, rest)
        } else {
            return Err(format!("unknown scheme tag {s:?}"));
        };

        let block: u32 = rest
            .parse()
            .map_err(|_| format!("scheme tag {s:?} has no block size"))?;
        if !(2..=MAX_BLOCK_SIZE).contains(&block) {
            return Err(format!("block size {block} out of range"));
        }

        Ok(Self { scheme, block })
    }
}

/// Trait for hash algorithm implementations
pub trait HashAlgorithm: Send + Sync {
    /// Compute a fingerprint from an already-decoded still image
    fn hash_image(&self, image: &DynamicImage) -> Result<Fingerprint, FingerprintError>;

    /// The tag stamped on every fingerprint this algorithm emits
    fn tag(&self) -> SchemeTag;
}
