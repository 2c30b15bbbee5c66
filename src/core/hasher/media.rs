//! Media references and still-frame extraction.
//!
//! Stills decode directly. Animated GIF/WebP/APNG are stepped through with
//! the image crate until the frame on screen at the seek offset. Videos are
//! handed to an external `ffmpeg`, mirroring how the browser seeks a
//! `<video>` element a little past zero to skip blank leading frames.

use super::fast_decode::FastDecoder;
use crate::error::FingerprintError;
use crossbeam_channel::bounded;
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frame, ImageResult};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Browsers clamp tiny GIF delays; match that so offsets land on real frames
const MIN_FRAME_DELAY_MS: u64 = 20;
const CLAMPED_FRAME_DELAY_MS: u64 = 100;

/// Where the media bytes live
#[derive(Debug, Clone)]
pub enum MediaData {
    /// A local file (already downloaded by the host)
    File(PathBuf),
    /// Bytes held in memory
    Bytes(Arc<[u8]>),
}

/// A media item to fingerprint.
///
/// `source_url` identifies the media for caching and error messages; the
/// bytes are provided by whoever downloaded it.
#[derive(Debug, Clone)]
pub struct MediaRef {
    source_url: String,
    data: MediaData,
    content_type: Option<String>,
}

impl MediaRef {
    /// Media stored in a local file, identified by `source_url`
    pub fn file(source_url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            data: MediaData::File(path.into()),
            content_type: None,
        }
    }

    /// A local file identified by its own path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::file(path.display().to_string(), path)
    }

    /// In-memory media identified by `source_url`
    pub fn bytes(source_url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source_url: source_url.into(),
            data: MediaData::Bytes(bytes.into()),
            content_type: None,
        }
    }

    /// Attach the `Content-Type` the host saw when downloading
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn data(&self) -> &MediaData {
        &self.data
    }

    /// Lowercase extension of the URL or file path, ignoring query strings
    fn extension(&self) -> Option<String> {
        let from_url = self
            .source_url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        from_url.or_else(|| match &self.data {
            MediaData::File(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
            MediaData::Bytes(_) => None,
        })
    }

    fn read_bytes(&self) -> Result<Arc<[u8]>, FingerprintError> {
        match &self.data {
            MediaData::Bytes(bytes) => Ok(Arc::clone(bytes)),
            MediaData::File(path) => std::fs::read(path)
                .map(Arc::from)
                .map_err(|source| FingerprintError::Io {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

/// Broad media category, decides how a frame is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image, or an image format that may carry animation
    Image,
    /// Known animated format (GIF)
    Animation,
    /// Container video decoded through ffmpeg
    Video,
}

impl MediaKind {
    /// Detect from the declared content type, then the extension, then
    /// the leading bytes. Defaults to `Image`.
    pub fn detect(media: &MediaRef, head: Option<&[u8]>) -> Self {
        if let Some(content_type) = media.content_type.as_deref() {
            let content_type = content_type.to_ascii_lowercase();
            if content_type.contains("image/gif") {
                return MediaKind::Animation;
            }
            if content_type.contains("video/") {
                return MediaKind::Video;
            }
            if content_type.contains("image/") {
                return MediaKind::Image;
            }
        }

        match media.extension().as_deref() {
            Some("gif") => return MediaKind::Animation,
            Some("mp4" | "webm" | "mov" | "mkv" | "m4v") => return MediaKind::Video,
            _ => {}
        }

        match head {
            Some(bytes) if looks_like_video(bytes) => MediaKind::Video,
            Some(bytes) if bytes.starts_with(b"GIF8") => MediaKind::Animation,
            _ => MediaKind::Image,
        }
    }
}

/// ISO-BMFF (`ftyp` box) or Matroska/WebM (EBML magic)
fn looks_like_video(bytes: &[u8]) -> bool {
    (bytes.len() >= 8 && &bytes[4..8] == b"ftyp" && !is_heif_brand(bytes))
        || bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])
}

fn is_heif_brand(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && matches!(&bytes[8..12], b"heic" | b"heix" | b"mif1" | b"avif")
}

/// Turns a [`MediaRef`] into one decoded still frame
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    offset: Duration,
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FrameExtractor {
    pub fn new(offset: Duration, ffmpeg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            offset,
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }

    /// Decode the frame to hash
    pub fn extract(&self, media: &MediaRef) -> Result<DynamicImage, FingerprintError> {
        // Videos on disk go straight to ffmpeg without being read
        if let MediaData::File(path) = media.data() {
            if MediaKind::detect(media, None) == MediaKind::Video {
                return self.video_frame(media, path);
            }
        }

        let bytes = media.read_bytes()?;
        let head = &bytes[..bytes.len().min(16)];

        match MediaKind::detect(media, Some(head)) {
            MediaKind::Video => self.video_frame_from_bytes(media, &bytes),
            MediaKind::Animation | MediaKind::Image => self.image_frame(media, &bytes),
        }
    }

    fn image_frame(&self, media: &MediaRef, bytes: &[u8]) -> Result<DynamicImage, FingerprintError> {
        let offset_ms = self.offset.as_millis() as u64;
        let seek_error = |e: image::ImageError| FingerprintError::FrameExtraction {
            source_url: media.source_url().to_string(),
            offset_ms,
            reason: e.to_string(),
        };

        let frame = match image::guess_format(bytes) {
            Ok(image::ImageFormat::Gif) => {
                let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(seek_error)?;
                Some(frame_at_offset(decoder.into_frames(), offset_ms).map_err(seek_error)?)
            }
            Ok(image::ImageFormat::WebP) => {
                let decoder = WebPDecoder::new(Cursor::new(bytes)).map_err(seek_error)?;
                if decoder.has_animation() {
                    Some(frame_at_offset(decoder.into_frames(), offset_ms).map_err(seek_error)?)
                } else {
                    None
                }
            }
            Ok(image::ImageFormat::Png) => {
                let decoder = PngDecoder::new(Cursor::new(bytes)).map_err(seek_error)?;
                if decoder.is_apng().map_err(seek_error)? {
                    let frames = decoder.apng().map_err(seek_error)?.into_frames();
                    Some(frame_at_offset(frames, offset_ms).map_err(seek_error)?)
                } else {
                    None
                }
            }
            _ => None,
        };

        match frame {
            Some(Some(frame)) => {
                debug!(source_url = media.source_url(), offset_ms, "using animation frame");
                Ok(DynamicImage::ImageRgba8(frame.into_buffer()))
            }
            Some(None) => Err(FingerprintError::EmptyMedia {
                source_url: media.source_url().to_string(),
            }),
            None => FastDecoder::decode(bytes),
        }
    }

    fn video_frame_from_bytes(
        &self,
        media: &MediaRef,
        bytes: &[u8],
    ) -> Result<DynamicImage, FingerprintError> {
        let suffix = format!(".{}", media.extension().unwrap_or_else(|| "mp4".to_string()));
        let io_error = |source| FingerprintError::Io {
            path: std::env::temp_dir(),
            source,
        };

        let mut spill = tempfile::Builder::new()
            .prefix("tagsaver_frame_")
            .suffix(&suffix)
            .tempfile()
            .map_err(io_error)?;
        spill.write_all(bytes).map_err(io_error)?;
        spill.flush().map_err(io_error)?;

        // The temp file is removed when `spill` drops
        self.video_frame(media, spill.path())
    }

    /// Ask ffmpeg for one PNG frame at the offset, killing it on timeout
    fn video_frame(&self, media: &MediaRef, path: &Path) -> Result<DynamicImage, FingerprintError> {
        let offset_ms = self.offset.as_millis() as u64;
        let failure = |reason: String| FingerprintError::FrameExtraction {
            source_url: media.source_url().to_string(),
            offset_ms,
            reason,
        };

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", self.offset.as_secs_f64()))
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| failure(format!("failed to run {}: {}", self.ffmpeg.display(), e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| failure("ffmpeg stdout unavailable".to_string()))?;

        let (sender, receiver) = bounded(1);
        thread::spawn(move || {
            let mut frame = Vec::new();
            let result = stdout.read_to_end(&mut frame).map(|_| frame);
            let _ = sender.send(result);
        });

        let started = Instant::now();
        let png = match receiver.recv_timeout(self.timeout) {
            Ok(Ok(png)) => png,
            Ok(Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(failure(format!("failed to read ffmpeg output: {}", e)));
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FingerprintError::Timeout {
                    source_url: media.source_url().to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        let status = child
            .wait()
            .map_err(|e| failure(format!("failed to wait for ffmpeg: {}", e)))?;
        if !status.success() || png.is_empty() {
            return Err(failure(format!("ffmpeg produced no frame ({})", status)));
        }

        debug!(
            source_url = media.source_url(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extracted video frame"
        );

        image::load_from_memory(&png).map_err(|e| failure(e.to_string()))
    }
}

/// Frame on screen at `offset_ms`, or the last frame of a shorter animation
fn frame_at_offset(
    frames: impl Iterator<Item = ImageResult<Frame>>,
    offset_ms: u64,
) -> ImageResult<Option<Frame>> {
    let mut elapsed_ms = 0u64;
    let mut last = None;

    for frame in frames {
        let frame = frame?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let mut delay_ms = if denom == 0 {
            0
        } else {
            u64::from(numer) / u64::from(denom)
        };
        if delay_ms < MIN_FRAME_DELAY_MS {
            delay_ms = CLAMPED_FRAME_DELAY_MS;
        }

        if elapsed_ms + delay_ms > offset_ms {
            return Ok(Some(frame));
        }
        elapsed_ms += delay_ms;
        last = Some(frame);
    }

    Ok(last)
}
