//! Cache-first tile fetching with bounded concurrency.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use image::RgbaImage;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cache::{TileCache, DEFAULT_TILE_CACHE_ENTRIES};
use super::source::TileSource;
use crate::error::TileFetchError;
use crate::geo::{normalize_tile_index, TileIndex};

/// Default limit on simultaneous provider requests.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Outcome of fetching one tile.
pub type TileResult = Result<Arc<TileBitmap>, TileFetchError>;

// =============================================================================
// Tile Bitmap
// =============================================================================

/// A decoded provider tile, tagged with the index it was fetched for.
///
/// Owned by the tile cache and shared read-only with composites.
#[derive(Debug, Clone)]
pub struct TileBitmap {
    pub index: TileIndex,
    pub image: RgbaImage,
}

impl TileBitmap {
    /// Decode an encoded tile (PNG or JPEG).
    pub fn decode(index: TileIndex, data: &[u8]) -> Result<Self, TileFetchError> {
        let image = image::load_from_memory(data)
            .map_err(|e| TileFetchError::Decode(format!("{}: {}", index, e)))?
            .to_rgba8();
        Ok(Self { index, image })
    }
}

// =============================================================================
// Tile Fetcher
// =============================================================================

/// Fetches tiles through a shared [`TileCache`].
///
/// - Every index is normalized before it touches the cache or the network
/// - Concurrent requests for the same tile share one provider request
/// - At most `parallelism` provider requests are in flight across all callers
pub struct TileFetcher<S> {
    source: S,
    cache: TileCache,
    permits: Semaphore,
    parallelism: usize,
    in_flight: Mutex<HashMap<TileIndex, Arc<Notify>>>,
}

impl<S: TileSource> TileFetcher<S> {
    /// Create a fetcher with a 200-tile cache and 10 parallel requests.
    pub fn new(source: S) -> Self {
        Self::with_options(source, DEFAULT_TILE_CACHE_ENTRIES, DEFAULT_PARALLELISM)
    }

    /// Create a fetcher with explicit cache size and parallelism.
    pub fn with_options(source: S, cache_entries: usize, parallelism: usize) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            source,
            cache: TileCache::with_capacity(cache_entries),
            permits: Semaphore::new(parallelism),
            parallelism,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Fetch a tile by raw (possibly out-of-range) coordinates.
    pub async fn fetch_raw(&self, x: i64, y: i64, zoom: u8) -> TileResult {
        self.fetch_tile(normalize_tile_index(x, y, zoom)).await
    }

    /// Fetch one tile, from cache when possible.
    pub async fn fetch_tile(&self, index: TileIndex) -> TileResult {
        let index = normalize_tile_index(index.x as i64, index.y as i64, index.zoom);

        loop {
            if let Some(tile) = self.cache.get(&index).await {
                debug!(tile = %index, "Tile cache hit");
                return Ok(tile);
            }

            let leader = {
                let mut in_flight = self.lock_in_flight();
                match in_flight.get(&index) {
                    Some(notify) => Err(notify.clone()),
                    None => {
                        let notify = Arc::new(Notify::new());
                        in_flight.insert(index, notify.clone());
                        Ok(notify)
                    }
                }
            };

            match leader {
                Ok(notify) => {
                    let _guard = InFlightGuard {
                        in_flight: &self.in_flight,
                        index,
                        notify,
                    };
                    let result = self.fetch_from_source(index).await;
                    if let Ok(ref tile) = result {
                        self.cache.put(index, tile.clone()).await;
                    }
                    return result;
                }
                Err(notify) => {
                    // Register before re-checking so a wake-up between the two
                    // cannot be missed.
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    let still_running = self
                        .lock_in_flight()
                        .get(&index)
                        .is_some_and(|current| Arc::ptr_eq(current, &notify));
                    if still_running {
                        notified.await;
                    }
                }
            }
        }
    }

    /// Fetch every tile in `indices`, returning one result per distinct
    /// normalized index.
    ///
    /// Duplicates (for example both ends of a viewport that wraps the
    /// antimeridian) are fetched once. When `cancel` fires, outstanding tiles
    /// resolve to [`TileFetchError::Cancelled`].
    pub async fn fetch_many(
        &self,
        indices: &[TileIndex],
        cancel: &CancellationToken,
    ) -> HashMap<TileIndex, TileResult> {
        let unique: BTreeSet<TileIndex> = indices
            .iter()
            .map(|i| normalize_tile_index(i.x as i64, i.y as i64, i.zoom))
            .collect();

        let fetches = unique.into_iter().map(|index| async move {
            if cancel.is_cancelled() {
                return (index, Err(TileFetchError::Cancelled));
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TileFetchError::Cancelled),
                result = self.fetch_tile(index) => result,
            };
            (index, result)
        });

        join_all(fetches).await.into_iter().collect()
    }

    async fn fetch_from_source(&self, index: TileIndex) -> TileResult {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TileFetchError::Cancelled)?;

        let data = self.source.fetch(index).await.map_err(|e| {
            warn!(
                tile = %index,
                error = %e,
                transient = e.is_transient(),
                "Tile fetch failed"
            );
            e
        })?;

        let bitmap = TileBitmap::decode(index, &data).map_err(|e| {
            warn!(tile = %index, error = %e, "Tile decode failed");
            e
        })?;

        Ok(Arc::new(bitmap))
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<TileIndex, Arc<Notify>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears a tile's in-flight marker and wakes waiters, including when the
/// leading fetch is dropped by cancellation.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<TileIndex, Arc<Notify>>>,
    index: TileIndex,
    notify: Arc<Notify>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.index);
        self.notify.notify_waiters();
    }
}

// =============================================================================
// Tests
// =============================================================================
