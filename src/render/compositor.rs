//! Tile compositing.
//!
//! Draws resolved tiles onto an output canvas, fills failed tiles with the
//! background color, and applies the effect chain.

use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};
use tracing::debug;

use super::effects::{apply_blur, apply_brightness, apply_overlay, EffectSettings};
use crate::error::RenderError;
use crate::fetch::TileResult;
use crate::viewport::{Dimensions, PixelRect, TilePlacement};

/// Background for the canvas and for tiles that failed to load.
pub const DEFAULT_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Largest canvas the compositor will try to allocate (about 1 GiB of RGBA).
pub const MAX_CANVAS_PIXELS: u64 = 16_384 * 16_384;

// =============================================================================
// Composite Result
// =============================================================================

/// A finished render.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    /// Pixels at the requested output size
    pub image: RgbaImage,

    /// Zoom the tiles were fetched at
    pub zoom: u8,

    /// Tiles drawn or attempted
    pub tile_count: usize,

    /// Tiles that failed and were filled with the background
    pub failed_tiles: usize,

    /// Whether this result came from the render cache
    pub cache_hit: bool,
}

impl CompositeResult {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }
}

// =============================================================================
// Compositor
// =============================================================================

/// Stateless tile compositor.
#[derive(Debug, Clone)]
pub struct Compositor {
    background: Rgba<u8>,
}

impl Compositor {
    pub fn new() -> Self {
        Self {
            background: DEFAULT_BACKGROUND,
        }
    }

    pub fn background(&self) -> Rgba<u8> {
        self.background
    }

    /// Draw `tiles` onto a fresh `output`-sized canvas and apply `settings`.
    ///
    /// Tiles are borrowed, never modified. Rectangles are disjoint, so draw
    /// order does not matter.
    ///
    /// # Errors
    ///
    /// Only [`RenderError::Allocation`], when the canvas cannot be allocated.
    pub fn composite(
        &self,
        output: Dimensions,
        zoom: u8,
        tiles: &[(TilePlacement, TileResult)],
        settings: &EffectSettings,
    ) -> Result<CompositeResult, RenderError> {
        let mut canvas = allocate_canvas(output, self.background)?;
        let mut failed_tiles = 0;

        for (placement, tile) in tiles {
            match tile {
                Ok(bitmap) => draw_tile(&mut canvas, &bitmap.image, placement.rect),
                Err(_) => {
                    fill_rect(&mut canvas, placement.rect, self.background);
                    failed_tiles += 1;
                }
            }
        }

        apply_brightness(&mut canvas, settings.brightness);
        let mut canvas = apply_blur(canvas, settings.blur_radius);
        apply_overlay(
            &mut canvas,
            settings.overlay_color(),
            settings.overlay_opacity,
        );

        debug!(
            width = output.width,
            height = output.height,
            tiles = tiles.len(),
            failed = failed_tiles,
            "Composite finished"
        );

        Ok(CompositeResult {
            image: canvas,
            zoom,
            tile_count: tiles.len(),
            failed_tiles,
            cache_hit: false,
        })
    }

    /// Resize `image` into `target` without distortion.
    ///
    /// The image is scaled uniformly to fit and centered; any leftover area
    /// is filled with the background (letterbox or pillarbox).
    pub fn fit_to(&self, image: &RgbaImage, target: Dimensions) -> Result<RgbaImage, RenderError> {
        if image.dimensions() == (target.width, target.height) {
            return Ok(image.clone());
        }

        let scale = f64::min(
            target.width as f64 / image.width() as f64,
            target.height as f64 / image.height() as f64,
        );
        let width = ((image.width() as f64 * scale).round() as u32).clamp(1, target.width);
        let height = ((image.height() as f64 * scale).round() as u32).clamp(1, target.height);
        let scaled = imageops::resize(image, width, height, FilterType::Triangle);

        let mut canvas = allocate_canvas(target, self.background)?;
        let x = (target.width - width) / 2;
        let y = (target.height - height) / 2;
        imageops::replace(&mut canvas, &scaled, x as i64, y as i64);
        Ok(canvas)
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Drawing Helpers
// =============================================================================

/// Allocate a canvas filled with `fill`, reporting failure instead of aborting.
pub fn allocate_canvas(size: Dimensions, fill: Rgba<u8>) -> Result<RgbaImage, RenderError> {
    let allocation_error = || RenderError::Allocation {
        width: size.width,
        height: size.height,
    };

    let pixels = size.pixel_count();
    if size.is_empty() || pixels > MAX_CANVAS_PIXELS {
        return Err(allocation_error());
    }

    let len = usize::try_from(pixels * 4).map_err(|_| allocation_error())?;
    let mut buffer: Vec<u8> = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| allocation_error())?;
    for _ in 0..pixels {
        buffer.extend_from_slice(&fill.0);
    }

    RgbaImage::from_raw(size.width, size.height, buffer).ok_or_else(allocation_error)
}

/// Canvas pixels `[x0, x1) x [y0, y1)` covered by a rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clip {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

fn clip_to_canvas(rect: PixelRect, canvas: &RgbaImage) -> Option<Clip> {
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    let clip = Clip {
        x0: rect.x.clamp(0, width) as u32,
        y0: rect.y.clamp(0, height) as u32,
        x1: rect.x.saturating_add(rect.width as i64).clamp(0, width) as u32,
        y1: rect.y.saturating_add(rect.height as i64).clamp(0, height) as u32,
    };
    (clip.x0 < clip.x1 && clip.y0 < clip.y1).then_some(clip)
}

fn draw_tile(canvas: &mut RgbaImage, tile: &RgbaImage, rect: PixelRect) {
    if rect.width == 0 || rect.height == 0 || tile.width() == 0 || tile.height() == 0 {
        return;
    }
    if tile.dimensions() == (rect.width, rect.height) {
        imageops::overlay(canvas, tile, rect.x, rect.y);
    } else if rect.width <= tile.width() && rect.height <= tile.height() {
        // Shrinking: the scaled tile is never larger than the source
        let scaled = imageops::resize(tile, rect.width, rect.height, FilterType::Triangle);
        imageops::overlay(canvas, &scaled, rect.x, rect.y);
    } else if let Some(clip) = clip_to_canvas(rect, canvas) {
        draw_magnified(canvas, tile, rect, clip);
    }
}

/// Bilinear upscale of `tile` into `rect`, touching only the clipped pixels.
///
/// The rect may be far larger than the canvas, so the scaled tile is never
/// materialized.
fn draw_magnified(canvas: &mut RgbaImage, tile: &RgbaImage, rect: PixelRect, clip: Clip) {
    let scale_x = tile.width() as f64 / rect.width as f64;
    let scale_y = tile.height() as f64 / rect.height as f64;

    for y in clip.y0..clip.y1 {
        let (row0, row1, fy) = source_span(y, rect.y, scale_y, tile.height());
        for x in clip.x0..clip.x1 {
            let (col0, col1, fx) = source_span(x, rect.x, scale_x, tile.width());
            let pixel = bilinear(
                [
                    tile.get_pixel(col0, row0),
                    tile.get_pixel(col1, row0),
                    tile.get_pixel(col0, row1),
                    tile.get_pixel(col1, row1),
                ],
                fx,
                fy,
            );
            if pixel[3] == u8::MAX {
                canvas.put_pixel(x, y, pixel);
            } else {
                canvas.get_pixel_mut(x, y).blend(&pixel);
            }
        }
    }
}

/// Source pixels straddling output pixel `position` and the weight of the
/// second one.
fn source_span(position: u32, origin: i64, scale: f64, extent: u32) -> (u32, u32, f64) {
    let last = (extent - 1) as f64;
    let center = ((position as i64 - origin) as f64 + 0.5) * scale - 0.5;
    let center = center.clamp(0.0, last);
    let first = center.floor();
    let second = (first + 1.0).min(last);
    (first as u32, second as u32, center - first)
}

fn bilinear(corners: [&Rgba<u8>; 4], fx: f64, fy: f64) -> Rgba<u8> {
    let weights = [
        (1.0 - fx) * (1.0 - fy),
        fx * (1.0 - fy),
        (1.0 - fx) * fy,
        fx * fy,
    ];
    let mut out = [0u8; 4];
    for (channel, value) in out.iter_mut().enumerate() {
        let sum: f64 = corners
            .iter()
            .zip(weights)
            .map(|(pixel, weight)| pixel.0[channel] as f64 * weight)
            .sum();
        *value = sum.round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

fn fill_rect(canvas: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>) {
    let Some(clip) = clip_to_canvas(rect, canvas) else {
        return;
    };
    for y in clip.y0..clip.y1 {
        for x in clip.x0..clip.x1 {
            canvas.put_pixel(x, y, color);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
