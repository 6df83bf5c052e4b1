//! Tile fetching layer.
//!
//! Retrieves provider tiles for a viewport: cache first, then the network,
//! with a process-wide bound on simultaneous requests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            WallpaperService             │
//! └────────────────────┬────────────────────┘
//!                      │ fetch_many(indices)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileFetcher                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  singleflight + │  │
//! │  │  (decoded    │  │  semaphore      │  │
//! │  │   tiles)     │  │  (≤ N requests) │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ fetch(index)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     TileSource (HttpTileSource)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileSource`]: async trait for anything that yields encoded tiles
//! - [`HttpTileSource`]: reqwest-backed source with connect/read timeouts
//! - [`UrlTemplate`]: `{z}`/`{x}`/`{y}` provider URL template
//! - [`TileCache`]: LRU of decoded tiles keyed by normalized index
//! - [`TileFetcher`]: normalization, caching, deduplication and bounded fetching

mod cache;
mod fetcher;
mod source;

pub use cache::{TileCache, DEFAULT_TILE_CACHE_ENTRIES};
pub use fetcher::{TileBitmap, TileFetcher, TileResult, DEFAULT_PARALLELISM};
pub use source::{
    HttpSourceConfig, HttpTileSource, TileSource, UrlTemplate, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_READ_TIMEOUT, DEFAULT_TILE_URL_TEMPLATE, DEFAULT_USER_AGENT,
};
