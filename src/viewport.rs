//! Viewport resolution.
//!
//! Turns a [`ViewportRequest`] (geographic center, zoom, output size and the
//! caller's pan/scale gesture state) into the set of tiles to fetch and the
//! exact output rectangle each one is drawn into.
//!
//! # Geometry
//!
//! All pan and scale values live in the *reference* screen's pixel space,
//! which is the screen the user looked at while choosing the view. The
//! reference extent divided by `scale` is the visible area; `tile_scale` maps
//! that area onto the output canvas with one uniform factor:
//!
//! ```text
//!   reference screen (preview)            output canvas (export)
//!   ┌───────────────┐                     ┌─────────────────────────┐
//!   │   ┌───────┐   │  tile_scale = min(  │                         │
//!   │   │visible│   │    out.w / vis.w,   │        same area,       │
//!   │   └───────┘   │    out.h / vis.h)   │      more pixels        │
//!   └───────────────┘  ─────────────────▶ │                         │
//!                                         └─────────────────────────┘
//! ```
//!
//! Tiles are placed relative to the *fractional* center tile, so a pan moves
//! the image continuously rather than in whole-tile steps. Each tile's output
//! rectangle is snapped to integer edges shared with its neighbours, which
//! leaves no gaps between tiles at any scale.
//!
//! # Coverage
//!
//! Tile bounds are computed from the area the output canvas shows at
//! `tile_scale`. On the axis that limits `tile_scale` this is exactly the
//! visible area; on the other axis it extends past it, so the canvas is
//! always fully covered with imagery instead of bars.

use crate::error::RenderError;
use crate::geo::{
    meters_per_pixel, normalize_tile_index, to_geo_location, to_tile_point, GeoLocation,
    TileIndex, TilePoint, MAX_MERCATOR_LATITUDE, MAX_ZOOM, METERS_PER_DEGREE, MIN_ZOOM,
    TILE_SIZE,
};

/// Deepest zoom the tile index type can address.
const ZOOM_LIMIT: u8 = 30;

/// Slack for float rounding when a bound lands exactly on a canvas edge.
const COVERAGE_EPSILON: f64 = 1e-6;

/// Largest pinch scale a request may carry.
pub const MAX_SCALE: f64 = 64.0;

/// Most tile slots one viewport may span. Larger spans are rejected before
/// any fetch.
pub const MAX_VIEWPORT_TILES: usize = 2048;

// =============================================================================
// Request Types
// =============================================================================

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Square counts as portrait.
    pub fn is_portrait(&self) -> bool {
        self.height >= self.width
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Zoom levels supported by the tile provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// Clamp any requested zoom into the range.
    pub fn clamp(&self, zoom: i32) -> u8 {
        zoom.clamp(self.min as i32, self.max as i32) as u8
    }

    pub fn contains(&self, zoom: i32) -> bool {
        zoom >= self.min as i32 && zoom <= self.max as i32
    }

    /// A range is usable when it is non-empty and addressable.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.min > self.max {
            return Err(RenderError::InvalidRequest(format!(
                "empty zoom range {}..={}",
                self.min, self.max
            )));
        }
        if self.max > ZOOM_LIMIT {
            return Err(RenderError::InvalidRequest(format!(
                "zoom {} exceeds the addressable limit of {}",
                self.max, ZOOM_LIMIT
            )));
        }
        Ok(())
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self::new(MIN_ZOOM, MAX_ZOOM)
    }
}

/// One render call's geometry.
///
/// Construct with [`ViewportRequest::new`] and the `with_*` builders; the
/// value is never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportRequest {
    /// Geographic center before panning
    pub center: GeoLocation,

    /// Size of the canvas to produce
    pub output: Dimensions,

    /// Requested zoom, clamped to the provider range during resolution
    pub zoom: i32,

    /// Horizontal pan in reference pixels (dragging content right is positive)
    pub pan_x: f64,

    /// Vertical pan in reference pixels
    pub pan_y: f64,

    /// Pinch scale, 1.0 means no gesture
    pub scale: f64,

    /// Screen the pan/scale were recorded on; defaults to `output`
    pub reference: Option<Dimensions>,

    /// Extra zoom levels to fetch for a denser export of the same area
    pub detail_zoom: i32,
}

impl ViewportRequest {
    pub fn new(center: GeoLocation, output: Dimensions, zoom: i32) -> Self {
        Self {
            center,
            output,
            zoom,
            pan_x: 0.0,
            pan_y: 0.0,
            scale: 1.0,
            reference: None,
            detail_zoom: 0,
        }
    }

    pub fn with_pan(mut self, pan_x: f64, pan_y: f64) -> Self {
        self.pan_x = pan_x;
        self.pan_y = pan_y;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_reference(mut self, reference: Dimensions) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_detail_zoom(mut self, levels: i32) -> Self {
        self.detail_zoom = levels;
        self
    }

    /// The screen pan and scale refer to.
    pub fn reference_size(&self) -> Dimensions {
        self.reference.unwrap_or(self.output)
    }

    /// True when no gesture transform or resolution change is baked in.
    ///
    /// Only such requests may share a render cache entry.
    pub fn is_untransformed(&self) -> bool {
        self.pan_x == 0.0
            && self.pan_y == 0.0
            && self.scale == 1.0
            && self.reference_size() == self.output
            && self.detail_zoom == 0
    }

    /// Reject requests that cannot be rendered, before any network activity.
    pub fn validate(&self, zooms: &ZoomRange) -> Result<(), RenderError> {
        zooms.validate()?;

        if !self.center.is_valid() {
            return Err(RenderError::InvalidRequest(format!(
                "center {} is not a valid coordinate",
                self.center
            )));
        }
        if self.output.is_empty() {
            return Err(RenderError::InvalidRequest(format!(
                "output size {}x{} is empty",
                self.output.width, self.output.height
            )));
        }
        let reference = self.reference_size();
        if reference.is_empty() {
            return Err(RenderError::InvalidRequest(format!(
                "reference size {}x{} is empty",
                reference.width, reference.height
            )));
        }
        if !self.pan_x.is_finite() || !self.pan_y.is_finite() {
            return Err(RenderError::InvalidRequest(
                "pan offset must be finite".to_string(),
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(RenderError::InvalidRequest(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        if self.scale > MAX_SCALE {
            return Err(RenderError::InvalidRequest(format!(
                "scale {} exceeds the maximum of {}",
                self.scale, MAX_SCALE
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Resolved Viewport
// =============================================================================

/// Inclusive tile index bounds in raw (unnormalized) tile space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl TileBounds {
    pub fn columns(&self) -> i64 {
        self.max_x - self.min_x + 1
    }

    pub fn rows(&self) -> i64 {
        self.max_y - self.min_y + 1
    }

    /// Number of tile slots, or `None` if it does not fit in `usize`.
    pub fn slot_count(&self) -> Option<usize> {
        let columns = usize::try_from(self.columns().max(0)).ok()?;
        let rows = usize::try_from(self.rows().max(0)).ok()?;
        columns.checked_mul(rows)
    }
}

/// Integer output rectangle a tile is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Whether any part of the rectangle lands on a canvas of `size`.
    pub fn intersects(&self, size: Dimensions) -> bool {
        self.width > 0
            && self.height > 0
            && self.x < size.width as i64
            && self.y < size.height as i64
            && self.x + self.width as i64 > 0
            && self.y + self.height as i64 > 0
    }
}

/// Where one tile goes on the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    /// Raw column, may lie outside `[0, 2^zoom)` near the antimeridian
    pub column: i64,
    /// Raw row
    pub row: i64,
    /// Normalized tile to fetch
    pub index: TileIndex,
    /// Output rectangle
    pub rect: PixelRect,
}

/// The result of [`resolve`]: tile bounds plus the draw transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedViewport {
    /// Zoom after clamping; pan and visible-area math use this level
    pub zoom: u8,

    /// Zoom tiles are fetched at (`zoom` plus the effective detail levels)
    pub fetch_zoom: u8,

    /// Center after applying the pan offset
    pub adjusted_center: GeoLocation,

    /// Fractional tile coordinates of `adjusted_center` at `fetch_zoom`
    pub center_tile: TilePoint,

    /// Tiles to draw, at `fetch_zoom`
    pub bounds: TileBounds,

    /// Output pixels per reference pixel
    pub reference_scale: f64,

    /// Output pixels per fetched tile pixel
    pub tile_scale: f64,

    /// Visible area in reference pixels (`reference / scale`)
    pub visible_width: f64,
    pub visible_height: f64,

    /// Ground resolution of one reference pixel
    pub meters_per_pixel: f64,

    /// Canvas size
    pub output: Dimensions,
}

impl ResolvedViewport {
    /// Output position of a tile's top-left corner.
    pub fn draw_position(&self, column: i64, row: i64) -> (f64, f64) {
        let step = TILE_SIZE as f64 * self.tile_scale;
        (
            self.output.width as f64 / 2.0 + (column as f64 - self.center_tile.x) * step,
            self.output.height as f64 / 2.0 + (row as f64 - self.center_tile.y) * step,
        )
    }

    /// Every tile that lands on the canvas, row-major.
    pub fn placements(&self) -> Vec<TilePlacement> {
        let mut placements =
            Vec::with_capacity(self.tile_count().min(MAX_VIEWPORT_TILES));

        for row in self.bounds.min_y..=self.bounds.max_y {
            for column in self.bounds.min_x..=self.bounds.max_x {
                let (left, top) = self.draw_position(column, row);
                let (right, bottom) = self.draw_position(column + 1, row + 1);
                let x = left.round() as i64;
                let y = top.round() as i64;
                let rect = PixelRect {
                    x,
                    y,
                    width: edge_length(x, right),
                    height: edge_length(y, bottom),
                };
                if !rect.intersects(self.output) {
                    continue;
                }
                placements.push(TilePlacement {
                    column,
                    row,
                    index: normalize_tile_index(column, row, self.fetch_zoom),
                    rect,
                });
            }
        }

        placements
    }

    /// Number of tile slots inside the bounds, saturating at `usize::MAX`.
    pub fn tile_count(&self) -> usize {
        self.bounds.slot_count().unwrap_or(usize::MAX)
    }

    /// True when the bounds, drawn at `tile_scale`, span the whole canvas.
    pub fn covers_output(&self) -> bool {
        let step = TILE_SIZE as f64 * self.tile_scale;
        let (left, top) = self.draw_position(self.bounds.min_x, self.bounds.min_y);
        let (right, bottom) = self.draw_position(self.bounds.max_x + 1, self.bounds.max_y + 1);
        self.bounds.columns() as f64 * step >= self.output.width as f64
            && self.bounds.rows() as f64 * step >= self.output.height as f64
            && left <= COVERAGE_EPSILON
            && top <= COVERAGE_EPSILON
            && right >= self.output.width as f64 - COVERAGE_EPSILON
            && bottom >= self.output.height as f64 - COVERAGE_EPSILON
    }

    /// Ground size of the area the canvas shows, in meters.
    pub fn ground_extent(&self) -> (f64, f64) {
        (
            self.output.width as f64 / self.reference_scale * self.meters_per_pixel,
            self.output.height as f64 / self.reference_scale * self.meters_per_pixel,
        )
    }

    /// Geographic point under an output pixel.
    pub fn location_at(&self, px: f64, py: f64) -> GeoLocation {
        let step = TILE_SIZE as f64 * self.tile_scale;
        let x = self.center_tile.x + (px - self.output.width as f64 / 2.0) / step;
        let y = self.center_tile.y + (py - self.output.height as f64 / 2.0) / step;
        to_geo_location(x, y, self.fetch_zoom)
    }
}

fn edge_length(start: i64, end: f64) -> u32 {
    (end.round() as i64)
        .saturating_sub(start)
        .clamp(0, u32::MAX as i64) as u32
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve a request into tile bounds and a draw transform.
///
/// # Errors
///
/// Returns [`RenderError::InvalidRequest`] for non-finite coordinates, empty
/// sizes, a scale outside `(0, MAX_SCALE]`, an unusable zoom range, or a
/// view spanning more than [`MAX_VIEWPORT_TILES`] tiles.
pub fn resolve(
    request: &ViewportRequest,
    zooms: &ZoomRange,
) -> Result<ResolvedViewport, RenderError> {
    request.validate(zooms)?;

    let zoom = zooms.clamp(request.zoom);
    let fetch_zoom = zooms.clamp(zoom as i32 + request.detail_zoom);
    let detail = fetch_zoom as i32 - zoom as i32;
    let detail_factor = 2f64.powi(detail);

    let reference = request.reference_size();
    let latitude = request
        .center
        .latitude
        .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let mpp = meters_per_pixel(latitude, zoom);

    let visible_width = reference.width as f64 / request.scale;
    let visible_height = reference.height as f64 / request.scale;

    // Flat-earth conversion; adequate for on-screen pan distances.
    let pan_meters_x = -request.pan_x * mpp;
    let pan_meters_y = request.pan_y * mpp;
    let lat_offset = pan_meters_y / METERS_PER_DEGREE;
    let lon_offset = pan_meters_x / (METERS_PER_DEGREE * latitude.to_radians().cos());
    let adjusted_center = request.center.offset(lat_offset, lon_offset);

    let center_tile = to_tile_point(
        adjusted_center.latitude,
        adjusted_center.longitude,
        fetch_zoom,
    );

    let reference_scale = f64::min(
        request.output.width as f64 / visible_width,
        request.output.height as f64 / visible_height,
    );
    let tile_scale = reference_scale / detail_factor;

    let span_x = request.output.width as f64 / tile_scale / TILE_SIZE as f64;
    let span_y = request.output.height as f64 / tile_scale / TILE_SIZE as f64;
    let min_x = (center_tile.x - span_x / 2.0).floor();
    let max_x = (center_tile.x + span_x / 2.0).ceil();
    let min_y = (center_tile.y - span_y / 2.0).floor();
    let max_y = (center_tile.y + span_y / 2.0).ceil();

    // Checked in floating point so absurd spans never reach integer math.
    let slots = (max_x - min_x + 1.0) * (max_y - min_y + 1.0);
    if !slots.is_finite() || slots > MAX_VIEWPORT_TILES as f64 {
        return Err(RenderError::InvalidRequest(format!(
            "view spans {:.0} tiles at zoom {}, the limit is {}",
            slots, fetch_zoom, MAX_VIEWPORT_TILES
        )));
    }

    let bounds = TileBounds {
        min_x: min_x as i64,
        max_x: max_x as i64,
        min_y: min_y as i64,
        max_y: max_y as i64,
    };

    Ok(ResolvedViewport {
        zoom,
        fetch_zoom,
        adjusted_center,
        center_tile,
        bounds,
        reference_scale,
        tile_scale,
        visible_width,
        visible_height,
        meters_per_pixel: mpp,
        output: request.output,
    })
}

// =============================================================================
// Tests
// =============================================================================
