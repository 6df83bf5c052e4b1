//! Export encoding.
//!
//! Turns a finished composite into bytes for whatever stores or shows it
//! (a file, an HTTP response, a wallpaper API).
//!
//! # Design Decisions
//!
//! - **JPEG drops alpha**: composites are opaque, so JPEG output is encoded
//!   from the RGB channels only.
//!
//! - **PNG is lossless**: used where exact pixels matter, such as the durable
//!   render cache.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder as _, ImageFormat, RgbaImage};

use crate::error::RenderError;

/// Default JPEG quality for saved exports.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// JPEG quality for previews served over HTTP.
pub const PREVIEW_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Export Format
// =============================================================================

/// Byte format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jpeg { quality: u8 },
    Png,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Jpeg { .. } => "image/jpeg",
            ExportFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jpeg { .. } => "jpg",
            ExportFormat::Png => "png",
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Jpeg { quality } => write!(f, "jpeg (quality {})", quality),
            ExportFormat::Png => write!(f, "png"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    /// Parses `jpeg`, `jpg` or `png`; JPEG uses the default quality.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ExportFormat::default()),
            "png" => Ok(ExportFormat::Png),
            other => Err(format!("unknown export format '{}'", other)),
        }
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Encoder for finished composites.
#[derive(Debug, Clone, Default)]
pub struct ExportEncoder {}

impl ExportEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode in the given format.
    pub fn encode(&self, image: &RgbaImage, format: ExportFormat) -> Result<Bytes, RenderError> {
        match format {
            ExportFormat::Jpeg { quality } => self.encode_jpeg(image, quality),
            ExportFormat::Png => self.encode_png(image),
        }
    }

    /// Encode as JPEG. Quality is clamped to 1..=100.
    pub fn encode_jpeg(&self, image: &RgbaImage, quality: u8) -> Result<Bytes, RenderError> {
        let quality = clamp_quality(quality);
        let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();

        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, quality)
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        Ok(Bytes::from(output))
    }

    /// Encode as PNG (lossless, keeps alpha).
    pub fn encode_png(&self, image: &RgbaImage) -> Result<Bytes, RenderError> {
        let mut output = Vec::new();
        PngEncoder::new(&mut output)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        Ok(Bytes::from(output))
    }

    /// Decode a PNG produced by [`encode_png`](Self::encode_png).
    pub fn decode_png(&self, data: &[u8]) -> Result<RgbaImage, String> {
        image::load(Cursor::new(data), ImageFormat::Png)
            .map(|img| img.to_rgba8())
            .map_err(|e| e.to_string())
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
