//! Test utilities for integration tests.
//!
//! Provides a mock tile provider that paints every tile a color derived from
//! its index, so tests can check which tile landed where.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};

use wallstitch::cache::RenderCache;
use wallstitch::error::TileFetchError;
use wallstitch::fetch::{TileFetcher, TileSource};
use wallstitch::geo::{GeoLocation, TileIndex, TILE_SIZE};
use wallstitch::render::{EffectSettings, ExportEncoder, RenderRequest, WallpaperService};
use wallstitch::viewport::{Dimensions, ViewportRequest, ZoomRange};

/// Center of the Richat Structure, Mauritania.
pub const RICHAT: GeoLocation = GeoLocation {
    latitude: 21.1269,
    longitude: -11.4016,
};

/// Color a mock tile is painted with.
pub fn tile_color(index: TileIndex) -> Rgba<u8> {
    Rgba([
        (index.x % 251) as u8,
        (index.y % 241) as u8,
        index.zoom.wrapping_mul(13),
        255,
    ])
}

/// Encode a solid tile as PNG.
pub fn png_tile(color: Rgba<u8>) -> Bytes {
    ExportEncoder::new()
        .encode_png(&RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, color))
        .unwrap()
}

/// Check JPEG magic bytes.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 3 && data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF
}

// =============================================================================
// Mock Tile Source
// =============================================================================

#[derive(Default)]
struct MockState {
    requests: AtomicUsize,
    requested: Mutex<Vec<TileIndex>>,
    failing: Mutex<HashSet<TileIndex>>,
    fail_all: Mutex<bool>,
}

/// In-memory tile provider.
///
/// Clones share state, so a test can keep a handle after moving the source
/// into a service.
#[derive(Clone, Default)]
pub struct MockTileSource {
    state: Arc<MockState>,
    delay: Option<Duration>,
}

impl MockTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering, so concurrent requests overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make one tile answer with a server error.
    pub fn fail_tile(&self, index: TileIndex) {
        self.state.failing.lock().unwrap().insert(index);
    }

    /// Make every tile answer with a server error.
    pub fn fail_all(&self, fail: bool) {
        *self.state.fail_all.lock().unwrap() = fail;
    }

    /// Number of provider calls so far.
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Every index requested so far, in call order.
    pub fn requested(&self) -> Vec<TileIndex> {
        self.state.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    async fn fetch(&self, index: TileIndex) -> Result<Bytes, TileFetchError> {
        self.state.requests.fetch_add(1, Ordering::SeqCst);
        self.state.requested.lock().unwrap().push(index);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = *self.state.fail_all.lock().unwrap()
            || self.state.failing.lock().unwrap().contains(&index);
        if failing {
            return Err(TileFetchError::Status {
                status: 500,
                url: format!("mock://{}", index),
            });
        }

        Ok(png_tile(tile_color(index)))
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Service over `source` with default tile and render caches.
pub fn service_for(source: MockTileSource) -> Arc<WallpaperService<MockTileSource>> {
    Arc::new(WallpaperService::new(source))
}

/// Service over `source` with an explicit render cache.
pub fn service_with_cache(
    source: MockTileSource,
    cache: RenderCache,
) -> WallpaperService<MockTileSource> {
    WallpaperService::with_components(TileFetcher::new(source), cache, ZoomRange::default())
}

/// Untransformed request with no effects.
pub fn plain_request(center: GeoLocation, width: u32, height: u32, zoom: i32) -> RenderRequest {
    let viewport = ViewportRequest::new(center, Dimensions::new(width, height), zoom);
    RenderRequest::new(viewport, EffectSettings::none())
}
