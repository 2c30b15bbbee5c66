//! Fast still-image decoding with format-specific optimizations.
//!
//! Uses zune-jpeg for JPEG data (1.5-2x faster than the image crate),
//! falls back to the image crate for everything else.

use crate::error::FingerprintError;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

/// Fast image decoder that uses optimized decoders per format
pub struct FastDecoder;

impl FastDecoder {
    /// Decode still-image bytes using the fastest available decoder.
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage, FingerprintError> {
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Jpeg) => {
                Self::decode_jpeg(bytes).or_else(|_| Self::decode_fallback(bytes))
            }
            _ => Self::decode_fallback(bytes),
        }
    }

    /// Fast JPEG decoding using zune-jpeg
    fn decode_jpeg(bytes: &[u8]) -> Result<DynamicImage, FingerprintError> {
        let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = JpegDecoder::new_with_options(bytes, options);

        let pixels = decoder
            .decode()
            .map_err(|e| decode_error(format!("zune-jpeg decode failed: {:?}", e)))?;

        let info = decoder
            .info()
            .ok_or_else(|| decode_error("failed to get image info".to_string()))?;

        let width = info.width as u32;
        let height = info.height as u32;

        let out_colorspace = decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB);

        let image = match out_colorspace {
            ColorSpace::RGB => {
                let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("failed to create RGB buffer".to_string()))?;
                DynamicImage::ImageRgb8(buffer)
            }
            ColorSpace::RGBA => {
                let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("failed to create RGBA buffer".to_string()))?;
                DynamicImage::ImageRgba8(buffer)
            }
            ColorSpace::Luma => {
                let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("failed to create Luma buffer".to_string()))?;
                DynamicImage::ImageLuma8(buffer)
            }
            _ => return Self::decode_fallback(bytes),
        };

        Ok(image)
    }

    /// Fallback to the image crate
    fn decode_fallback(bytes: &[u8]) -> Result<DynamicImage, FingerprintError> {
        image::load_from_memory(bytes).map_err(|e| decode_error(e.to_string()))
    }
}

fn decode_error(reason: String) -> FingerprintError {
    FingerprintError::Decode {
        source_url: String::new(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Cursor;

    fn encode(image: &DynamicImage, format: image::ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(24, 16, |x, y| {
            Rgb([(x * 10) as u8, (y * 15) as u8, 90])
        }))
    }

    #[test]
    fn decodes_png() {
        let decoded = FastDecoder::decode(&encode(&sample(), image::ImageFormat::Png)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (24, 16));
    }

    #[test]
    fn decodes_jpeg() {
        let decoded = FastDecoder::decode(&encode(&sample(), image::ImageFormat::Jpeg)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (24, 16));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let result = FastDecoder::decode(b"this is not a valid image file");
        assert!(matches!(result, Err(FingerprintError::Decode { .. })));
    }
}
