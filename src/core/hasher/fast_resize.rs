//! Alpha flattening and SIMD-accelerated downscaling.
//!
//! Uses fast_image_resize, which picks AVX2/NEON kernels when available.
//! Colour is kept through the resize so luma can be computed afterwards
//! with the exact weights the hash expects.

use crate::error::FingerprintError;
use fast_image_resize::{images::Image, PixelType, ResizeOptions, Resizer};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};

/// Composite an image onto an opaque background colour.
///
/// Transparent regions take the background colour so they do not drag the
/// luminance towards black.
pub fn flatten_onto(image: &DynamicImage, background: [u8; 3]) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = f32::from(a) / 255.0;
        let blend = |channel: u8, bg: u8| -> u8 {
            (f32::from(channel) * alpha + f32::from(bg) * (1.0 - alpha)).round() as u8
        };
        Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}

/// Reusable RGB resizer
pub struct FastResizer {
    resizer: Resizer,
}

impl FastResizer {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
        }
    }

    /// Downscale an RGB image to exactly `width` x `height`.
    pub fn resize_rgb(
        &mut self,
        image: &RgbImage,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, FingerprintError> {
        let (src_width, src_height) = image.dimensions();

        if src_width == 0 || src_height == 0 {
            return Err(FingerprintError::EmptyMedia {
                source_url: String::new(),
            });
        }

        if width == 0 || height == 0 {
            return Err(resize_error("invalid destination dimensions".to_string()));
        }

        let src_image =
            Image::from_vec_u8(src_width, src_height, image.as_raw().clone(), PixelType::U8x3)
                .map_err(|e| resize_error(format!("failed to create source image: {}", e)))?;

        let mut dst_image = Image::new(width, height, PixelType::U8x3);

        // Box filter averages every source pixel into the grid cell
        let options = ResizeOptions::new().resize_alg(fast_image_resize::ResizeAlg::Convolution(
            fast_image_resize::FilterType::Box,
        ));

        self.resizer
            .resize(&src_image, &mut dst_image, &options)
            .map_err(|e| resize_error(format!("resize failed: {}", e)))?;

        ImageBuffer::from_raw(width, height, dst_image.into_vec())
            .ok_or_else(|| resize_error("failed to create result buffer".to_string()))
    }
}

impl Default for FastResizer {
    fn default() -> Self {
        Self::new()
    }
}

fn resize_error(reason: String) -> FingerprintError {
    FingerprintError::Decode {
        source_url: String::new(),
        reason,
    }
}

/// Flatten alpha and downscale in one step
pub fn flatten_and_resize(
    image: &DynamicImage,
    background: [u8; 3],
    width: u32,
    height: u32,
) -> Result<RgbImage, FingerprintError> {
    let flat = flatten_onto(image, background);
    FastResizer::new().resize_rgb(&flat, width, height)
}
