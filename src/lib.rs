//! # wallstitch
//!
//! Renders seamless wallpaper-sized images for any geographic viewport by
//! stitching slippy-map satellite tiles.
//!
//! Given a center, a zoom, an output size and an optional pan/scale gesture,
//! the engine works out which tiles cover the canvas, fetches them with
//! bounded parallelism, draws them with no seams, applies cosmetic effects
//! and caches the result.
//!
//! ## Features
//!
//! - **Web Mercator math**: geographic and tile coordinates, ground resolution
//! - **Seam-free stitching**: tiles placed from the fractional center, so pans
//!   move continuously rather than in tile steps
//! - **Preview/export consistency**: a high-resolution export shows exactly
//!   the area of its preview, optionally with deeper tiles
//! - **Graceful degradation**: failed tiles are filled, counted and reported
//! - **Two-tier render cache**: in-memory LRU plus an optional disk store
//!
//! ## Architecture
//!
//! - [`geo`] - Coordinate math
//! - [`fetch`] - Tile sources, tile cache and bounded fetching
//! - [`viewport`] - Viewport resolution into tile bounds and placements
//! - [`render`] - Compositing, effects, export and orchestration
//! - [`cache`] - Render cache and durable stores
//! - [`output`] - Export resolution presets
//! - [`server`] - Axum-based HTTP server
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wallstitch::{
//!     Dimensions, EffectSettings, GeoLocation, HttpTileSource, RenderRequest, UrlTemplate,
//!     ViewportRequest, WallpaperService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = HttpTileSource::new(UrlTemplate::default())?;
//!     let service = WallpaperService::new(source);
//!
//!     let viewport = ViewportRequest::new(
//!         GeoLocation::new(21.1269, -11.4016),
//!         Dimensions::new(1080, 1920),
//!         12,
//!     );
//!     let result = service
//!         .render(&RenderRequest::new(viewport, EffectSettings::default()))
//!         .await?;
//!
//!     println!(
//!         "{} tiles, {} failed",
//!         result.tile_count, result.failed_tiles
//!     );
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod output;
pub mod render;
pub mod server;
pub mod viewport;

// Re-export commonly used types
pub use cache::{DiskStore, DurableStore, Fingerprint, MemoryStore, RenderCache};
pub use config::{Cli, Command, EngineArgs, RenderConfig, ServeConfig};
pub use error::{CacheError, RenderError, TileFetchError};
pub use fetch::{HttpTileSource, TileBitmap, TileCache, TileFetcher, TileSource, UrlTemplate};
pub use geo::{
    meters_per_pixel, normalize_tile_index, to_geo_location, to_tile_point, GeoLocation,
    TileIndex, TilePoint, TILE_SIZE,
};
pub use output::{target_dimensions, zoom_correction, Resolution};
pub use render::{
    CompositeResult, Compositor, EffectSettings, ExportEncoder, ExportFormat, RenderRequest,
    RenderSession, WallpaperService,
};
pub use server::{create_router, AppState, RouterConfig};
pub use viewport::{resolve, Dimensions, ResolvedViewport, ViewportRequest, ZoomRange};
