//! Post-processing effects.
//!
//! Applied in a fixed order after the tiles are drawn: brightness, blur,
//! then the color overlay. All effects work on row-major RGBA8 buffers.

use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Default overlay opacity.
pub const DEFAULT_OVERLAY_OPACITY: f32 = 0.1;

/// Default overlay color (opaque black).
pub const DEFAULT_OVERLAY_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Cosmetic settings for one render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSettings {
    /// Gaussian blur standard deviation in output pixels; 0 disables blur
    pub blur_radius: f32,

    /// Per-channel multiplier; 1.0 leaves colors unchanged
    pub brightness: f32,

    /// Opacity of the overlay rectangle in `[0, 1]`
    pub overlay_opacity: f32,

    /// Overlay color; its own alpha scales `overlay_opacity`
    pub overlay_color: [u8; 4],
}

impl EffectSettings {
    /// Settings that leave the composite untouched.
    pub fn none() -> Self {
        Self {
            blur_radius: 0.0,
            brightness: 1.0,
            overlay_opacity: 0.0,
            overlay_color: DEFAULT_OVERLAY_COLOR.0,
        }
    }

    pub fn with_blur(mut self, radius: f32) -> Self {
        self.blur_radius = radius;
        self
    }

    pub fn with_brightness(mut self, multiplier: f32) -> Self {
        self.brightness = multiplier;
        self
    }

    pub fn with_overlay(mut self, color: Rgba<u8>, opacity: f32) -> Self {
        self.overlay_color = color.0;
        self.overlay_opacity = opacity;
        self
    }

    pub fn overlay_color(&self) -> Rgba<u8> {
        Rgba(self.overlay_color)
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if !self.blur_radius.is_finite() || self.blur_radius < 0.0 {
            return Err(RenderError::InvalidRequest(format!(
                "blur radius must be >= 0, got {}",
                self.blur_radius
            )));
        }
        if !self.brightness.is_finite() || self.brightness < 0.0 {
            return Err(RenderError::InvalidRequest(format!(
                "brightness must be >= 0, got {}",
                self.brightness
            )));
        }
        if !(0.0..=1.0).contains(&self.overlay_opacity) {
            return Err(RenderError::InvalidRequest(format!(
                "overlay opacity must be within 0..=1, got {}",
                self.overlay_opacity
            )));
        }
        Ok(())
    }
}

impl Default for EffectSettings {
    /// A slight dark tint, as wallpapers are usually shown under icons.
    fn default() -> Self {
        Self {
            blur_radius: 0.0,
            brightness: 1.0,
            overlay_opacity: DEFAULT_OVERLAY_OPACITY,
            overlay_color: DEFAULT_OVERLAY_COLOR.0,
        }
    }
}

// =============================================================================
// Effects
// =============================================================================

/// Multiply every color channel, clamping to 0..=255. Alpha is untouched.
pub fn apply_brightness(image: &mut RgbaImage, multiplier: f32) {
    if multiplier == 1.0 {
        return;
    }
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = (*channel as f32 * multiplier).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Gaussian blur with standard deviation `radius`. A radius of zero returns
/// the image unchanged.
pub fn apply_blur(image: RgbaImage, radius: f32) -> RgbaImage {
    if radius <= 0.0 {
        return image;
    }
    imageops::blur(&image, radius)
}

/// Alpha-over a solid `color` at `opacity` across the whole image.
pub fn apply_overlay(image: &mut RgbaImage, color: Rgba<u8>, opacity: f32) {
    let alpha = opacity.clamp(0.0, 1.0) * color.0[3] as f32 / 255.0;
    if alpha <= 0.0 {
        return;
    }
    let keep = 1.0 - alpha;
    for pixel in image.pixels_mut() {
        for i in 0..3 {
            let blended = color.0[i] as f32 * alpha + pixel.0[i] as f32 * keep;
            pixel.0[i] = blended.round().clamp(0.0, 255.0) as u8;
        }
        let out_alpha = 255.0 * alpha + pixel.0[3] as f32 * keep;
        pixel.0[3] = out_alpha.round().clamp(0.0, 255.0) as u8;
    }
}

/// Parse `#RRGGBB` or `#AARRGGBB` (the leading `#` is optional).
pub fn parse_hex_color(value: &str) -> Result<Rgba<u8>, String> {
    let hex = value.trim().trim_start_matches('#');
    let byte = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| format!("invalid color '{}'", value))
    };

    if !hex.is_ascii() {
        return Err(format!("invalid color '{}'", value));
    }
    match hex.len() {
        6 => Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Ok(Rgba([byte(2)?, byte(4)?, byte(6)?, byte(0)?])),
        _ => Err(format!(
            "invalid color '{}': expected #RRGGBB or #AARRGGBB",
            value
        )),
    }
}
