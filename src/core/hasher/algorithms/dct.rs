//! DCT hash implementation.
//!
//! Works by:
//! 1. Flattening alpha onto a fixed background colour
//! 2. Downscaling to grid_size x grid_size
//! 3. Converting to luma (0.299 R + 0.587 G + 0.114 B)
//! 4. Taking a 2D DCT-II and keeping the block_size x block_size
//!    lowest-frequency coefficients, minus the DC term
//! 5. Emitting 1 for every coefficient at or above their mean
//!
//! Working in the frequency domain tolerates recompression and resizing
//! noise, and dropping DC removes sensitivity to uniform brightness shifts.

use super::super::fast_resize::flatten_and_resize;
use super::super::fingerprint::Fingerprint;
use super::super::traits::{HashAlgorithm, HashScheme, SchemeTag, MAX_BLOCK_SIZE};
use crate::error::FingerprintError;
use image::DynamicImage;
use std::f64::consts::PI;

/// DCT hash implementation
#[derive(Debug, Clone)]
pub struct DctHasher {
    /// Side of the downscaled luma grid
    grid_size: u32,
    /// Side of the retained low-frequency block
    block_size: u32,
    /// Colour transparent pixels are composited onto
    background: [u8; 3],
}

impl DctHasher {
    /// Create a new DCT hasher. `block_size` is clamped to `grid_size`
    /// and to [`MAX_BLOCK_SIZE`].
    pub fn new(grid_size: u32, block_size: u32) -> Self {
        let grid_size = grid_size.max(2);
        Self {
            grid_size,
            block_size: block_size.clamp(2, grid_size.min(MAX_BLOCK_SIZE)),
            background: [255, 255, 255],
        }
    }

    /// Set the background colour used for alpha compositing
    pub fn with_background(mut self, background: [u8; 3]) -> Self {
        self.background = background;
        self
    }
}

impl Default for DctHasher {
    fn default() -> Self {
        Self::new(32, 8)
    }
}

impl HashAlgorithm for DctHasher {
    fn hash_image(&self, image: &DynamicImage) -> Result<Fingerprint, FingerprintError> {
        let small = flatten_and_resize(image, self.background, self.grid_size, self.grid_size)?;

        let luma: Vec<f64> = small
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
            })
            .collect();

        Ok(fingerprint_from_luma(
            &luma,
            self.grid_size as usize,
            self.block_size as usize,
            self.tag(),
        ))
    }

    fn tag(&self) -> SchemeTag {
        SchemeTag::new(HashScheme::Dct, self.block_size)
    }
}

/// Hash a row-major `n` x `n` luma grid, keeping a `k` x `k` block.
pub(crate) fn fingerprint_from_luma(luma: &[f64], n: usize, k: usize, tag: SchemeTag) -> Fingerprint {
    let coefficients = low_frequency_dct(luma, n, k);

    // Row-major over the block, skipping (0, 0)
    let retained = &coefficients[1..];
    let mean = retained.iter().sum::<f64>() / retained.len() as f64;
    let bits: Vec<bool> = retained.iter().map(|&c| c >= mean).collect();

    Fingerprint::from_bits(tag, &bits)
}

/// Orthonormal 2D DCT-II restricted to the first `k` frequencies per axis.
///
/// Returns `k * k` coefficients, row-major by (vertical, horizontal)
/// frequency.
fn low_frequency_dct(luma: &[f64], n: usize, k: usize) -> Vec<f64> {
    let basis = dct_basis(n, k);

    // Horizontal pass: rows[y * k + u]
    let mut rows = vec![0.0; n * k];
    for y in 0..n {
        let row = &luma[y * n..(y + 1) * n];
        for u in 0..k {
            rows[y * k + u] = basis[u]
                .iter()
                .zip(row)
                .map(|(weight, value)| weight * value)
                .sum();
        }
    }

    // Vertical pass
    let mut coefficients = vec![0.0; k * k];
    for v in 0..k {
        for u in 0..k {
            coefficients[v * k + u] = (0..n).map(|y| basis[v][y] * rows[y * k + u]).sum();
        }
    }

    coefficients
}

/// `basis[f][x] = alpha(f) * cos(pi * (2x + 1) * f / 2n)`
fn dct_basis(n: usize, k: usize) -> Vec<Vec<f64>> {
    let scale_dc = (1.0 / n as f64).sqrt();
    let scale_ac = (2.0 / n as f64).sqrt();

    (0..k)
        .map(|f| {
            let scale = if f == 0 { scale_dc } else { scale_ac };
            (0..n)
                .map(|x| scale * (PI * (2 * x + 1) as f64 * f as f64 / (2 * n) as f64).cos())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comparator::distance;
    use image::{ImageBuffer, Rgb, Rgba};

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let v = ((x * 200) / width + (y * 40) / height) as u8;
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn mirrored_gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let v = (((width - 1 - x) * 200) / width + (y * 40) / height) as u8;
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn luma_ramp(n: usize, offset: f64) -> Vec<f64> {
        (0..n * n)
            .map(|i| {
                let (x, y) = (i % n, i / n);
                offset + (x * 6 + y * 2) as f64
            })
            .collect()
    }

    #[test]
    fn default_geometry_yields_63_bits() {
        let hasher = DctHasher::default();
        let fingerprint = hasher.hash_image(&gradient_image(120, 80)).unwrap();

        assert_eq!(fingerprint.bit_count(), 63);
        assert_eq!(fingerprint.hex().len(), 16);
        assert!(fingerprint.to_string().starts_with("dct8:"));
    }

    #[test]
    fn identical_images_produce_identical_fingerprint() {
        let hasher = DctHasher::default();
        let image = gradient_image(100, 100);

        let first = hasher.hash_image(&image).unwrap();
        let second = hasher.hash_image(&image).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn resized_copy_stays_close() {
        let hasher = DctHasher::default();
        let original = gradient_image(256, 256);
        let smaller = DynamicImage::ImageRgb8(image::imageops::resize(
            &original.to_rgb8(),
            128,
            100,
            image::imageops::FilterType::Triangle,
        ));

        let a = hasher.hash_image(&original).unwrap();
        let b = hasher.hash_image(&smaller).unwrap();

        let d = distance(&a, &b).unwrap();
        assert!(d <= 6, "resized copy drifted by {d} bits");
    }

    #[test]
    fn different_images_are_far_apart() {
        let hasher = DctHasher::default();

        let a = hasher.hash_image(&gradient_image(128, 128)).unwrap();
        let b = hasher.hash_image(&mirrored_gradient_image(128, 128)).unwrap();

        assert!(distance(&a, &b).unwrap() > 20);
    }

    #[test]
    fn uniform_brightness_shift_does_not_change_bits() {
        let tag = SchemeTag::new(HashScheme::Dct, 8);
        let base = fingerprint_from_luma(&luma_ramp(32, 10.0), 32, 8, tag);
        let brighter = fingerprint_from_luma(&luma_ramp(32, 60.0), 32, 8, tag);

        assert_eq!(base, brighter);
    }

    #[test]
    fn dc_only_grid_has_no_ac_energy() {
        let flat = vec![128.0; 16 * 16];
        let coefficients = low_frequency_dct(&flat, 16, 4);

        assert!((coefficients[0] - 128.0 * 16.0).abs() < 1e-6);
        assert!(coefficients[1..].iter().all(|c| c.abs() < 1e-6));
    }

    #[test]
    fn transparent_regions_match_background_fill() {
        let hasher = DctHasher::default();

        // Dark square on a transparent canvas vs the same square on white
        let transparent = ImageBuffer::from_fn(64, 64, |x, y| {
            if (16..48).contains(&x) && (16..48).contains(&y) {
                Rgba([20, 20, 20, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let opaque = ImageBuffer::from_fn(64, 64, |x, y| {
            if (16..48).contains(&x) && (16..48).contains(&y) {
                Rgb([20, 20, 20])
            } else {
                Rgb([255, 255, 255])
            }
        });

        let a = hasher
            .hash_image(&DynamicImage::ImageRgba8(transparent))
            .unwrap();
        let b = hasher.hash_image(&DynamicImage::ImageRgb8(opaque)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn block_size_is_clamped_to_grid() {
        let hasher = DctHasher::new(4, 16);
        assert_eq!(hasher.tag(), SchemeTag::new(HashScheme::Dct, 4));
    }
}
