//! Decoded tile cache.
//!
//! Tiles are immutable, so the cache only needs a bounded entry count and
//! least-recently-used eviction. Keys are normalized [`TileIndex`] values, so
//! requests for `x` and `x + 2^zoom` share one entry.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;

use super::TileBitmap;
use crate::geo::TileIndex;

/// Default number of decoded tiles kept in memory.
pub const DEFAULT_TILE_CACHE_ENTRIES: usize = 200;

/// LRU cache of decoded tiles shared by all renders.
///
/// Entries are handed out as `Arc<TileBitmap>` so concurrent composites can
/// read the same pixels while the cache evicts its own reference.
pub struct TileCache {
    cache: RwLock<LruCache<TileIndex, Arc<TileBitmap>>>,
    capacity: usize,
}

impl TileCache {
    /// Create a cache holding up to 200 tiles.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_ENTRIES)
    }

    /// Create a cache holding up to `capacity` tiles (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            capacity: capacity.get(),
        }
    }

    /// Get a tile, marking it as recently used.
    pub async fn get(&self, index: &TileIndex) -> Option<Arc<TileBitmap>> {
        let mut cache = self.cache.write().await;
        cache.get(index).cloned()
    }

    /// Check for a tile without touching LRU order.
    pub async fn contains(&self, index: &TileIndex) -> bool {
        let cache = self.cache.read().await;
        cache.contains(index)
    }

    /// Insert a tile, evicting the least recently used one at capacity.
    pub async fn put(&self, index: TileIndex, tile: Arc<TileBitmap>) {
        let mut cache = self.cache.write().await;
        cache.put(index, tile);
    }

    /// Drop every cached tile.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Maximum number of tiles held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
