//! Mean hash implementation.
//!
//! The scheme stored by older versions of the extension:
//! 1. Downscale to block_size x block_size
//! 2. gray = floor((R + G + B) / 3)
//! 3. Bit is 1 when gray is at or above the average gray
//!
//! Kept so fingerprints persisted by those versions can still be matched
//! against a compatible scheme. Not robust to edits.

use super::super::fast_resize::flatten_and_resize;
use super::super::fingerprint::Fingerprint;
use super::super::traits::{HashAlgorithm, HashScheme, SchemeTag, MAX_BLOCK_SIZE};
use crate::error::FingerprintError;
use image::DynamicImage;

/// Mean-threshold hash implementation
#[derive(Debug, Clone)]
pub struct MeanHasher {
    block_size: u32,
    background: [u8; 3],
}

impl MeanHasher {
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size: block_size.clamp(2, MAX_BLOCK_SIZE),
            background: [255, 255, 255],
        }
    }

    pub fn with_background(mut self, background: [u8; 3]) -> Self {
        self.background = background;
        self
    }
}

impl Default for MeanHasher {
    fn default() -> Self {
        Self::new(8)
    }
}

impl HashAlgorithm for MeanHasher {
    fn hash_image(&self, image: &DynamicImage) -> Result<Fingerprint, FingerprintError> {
        let small = flatten_and_resize(image, self.background, self.block_size, self.block_size)?;

        let gray: Vec<u32> = small
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                (u32::from(r) + u32::from(g) + u32::from(b)) / 3
            })
            .collect();

        let average = gray.iter().sum::<u32>() as f64 / gray.len() as f64;
        let bits: Vec<bool> = gray.iter().map(|&g| f64::from(g) >= average).collect();

        Ok(Fingerprint::from_bits(self.tag(), &bits))
    }

    fn tag(&self) -> SchemeTag {
        SchemeTag::new(HashScheme::Mean, self.block_size)
    }
}
