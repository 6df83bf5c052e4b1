//! Web Mercator coordinate math.
//!
//! Pure conversions between geographic coordinates, continuous slippy-map
//! tile space, and ground resolution. Nothing in this module allocates or
//! performs I/O.
//!
//! # Tile Space
//!
//! At zoom `z` the world is a square of `n = 2^z` tiles per axis. `x` grows
//! eastward from the antimeridian, `y` grows southward from the north edge of
//! the projection (latitude ~85.0511°).
//!
//! ```text
//!  (0,0) ──────────────▶ x
//!    │  ┌────┬────┐
//!    │  │0,0 │1,0 │   zoom 1: 2×2 tiles
//!    │  ├────┼────┤
//!    │  │0,1 │1,1 │
//!    ▼  └────┴────┘
//!    y
//! ```

use std::f64::consts::PI;
use std::fmt;

/// Edge length of a provider tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Ground resolution at the equator at zoom 0, in meters per pixel.
///
/// Earth's equatorial circumference divided by [`TILE_SIZE`].
pub const EQUATOR_METERS_PER_PIXEL: f64 = 156_543.033_92;

/// Lowest zoom level the default provider range allows.
pub const MIN_ZOOM: u8 = 3;

/// Highest zoom level the default provider range allows.
pub const MAX_ZOOM: u8 = 19;

/// Latitude at which the Web Mercator square ends.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_78;

/// Approximate length of one degree of latitude in meters.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

// =============================================================================
// Types
// =============================================================================

/// A point on the globe in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    /// Latitude in degrees, positive north
    pub latitude: f64,
    /// Longitude in degrees, positive east
    pub longitude: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both components are finite and inside their geographic ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Shift by a number of degrees.
    ///
    /// Longitude wraps across the antimeridian; latitude is clamped to the
    /// Mercator square so the result always projects to a finite tile point.
    pub fn offset(&self, lat_degrees: f64, lon_degrees: f64) -> Self {
        let latitude = (self.latitude + lat_degrees)
            .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
        Self {
            latitude,
            longitude: wrap_longitude(self.longitude + lon_degrees),
        }
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Continuous (not yet floored) tile-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePoint {
    pub x: f64,
    pub y: f64,
}

impl TilePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A normalized tile address.
///
/// `x` is always in `[0, 2^zoom)` and `y` in `[0, 2^zoom - 1]`, so two
/// addresses that differ by whole turns of longitude compare equal. Build
/// values with [`normalize_tile_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    /// Column, 0 at the antimeridian
    pub x: u32,
    /// Row, 0 at the north edge
    pub y: u32,
    /// Zoom level
    pub zoom: u8,
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Number of tiles along one axis at `zoom`.
#[inline]
pub fn tiles_per_axis(zoom: u8) -> f64 {
    2f64.powi(zoom as i32)
}

/// Project a geographic point into continuous tile space.
///
/// At the poles the secant is undefined; the north pole maps to `y = 0` and
/// the south pole to `y = n`.
pub fn to_tile_point(latitude: f64, longitude: f64, zoom: u8) -> TilePoint {
    let n = tiles_per_axis(zoom);
    let x = n * (longitude + 180.0) / 360.0;

    let lat_rad = latitude.to_radians();
    let cos = lat_rad.cos();
    let y = if cos.abs() < 1e-12 {
        if latitude > 0.0 {
            0.0
        } else {
            n
        }
    } else {
        n * (1.0 - (lat_rad.tan() + 1.0 / cos).ln() / PI) / 2.0
    };

    TilePoint { x, y }
}

/// Inverse of [`to_tile_point`].
pub fn to_geo_location(x: f64, y: f64, zoom: u8) -> GeoLocation {
    let n = tiles_per_axis(zoom);
    let longitude = x / n * 360.0 - 180.0;
    let latitude = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    GeoLocation {
        latitude,
        longitude,
    }
}

/// Ground distance covered by one tile pixel at `latitude` and `zoom`.
pub fn meters_per_pixel(latitude: f64, zoom: u8) -> f64 {
    EQUATOR_METERS_PER_PIXEL * latitude.to_radians().cos() / tiles_per_axis(zoom)
}

/// Wrap `x` around the antimeridian and clamp `y` to the pole rows.
pub fn normalize_tile_index(x: i64, y: i64, zoom: u8) -> TileIndex {
    let n = 1i64 << zoom;
    TileIndex {
        x: x.rem_euclid(n) as u32,
        y: y.clamp(0, n - 1) as u32,
        zoom,
    }
}

/// Bring a longitude back into `[-180, 180)`.
pub fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..180.0).contains(&longitude) {
        longitude
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}

// =============================================================================
// Tests
// =============================================================================
