//! Two-tier cache of finished renders.
//!
//! The memory tier is an LRU of decoded composites. The optional durable
//! tier mirrors entries into a [`DurableStore`] with its own, larger bound.
//! Durable writes run in the background so a render returns as soon as its
//! pixels are ready; [`RenderCache::flush`] waits for them.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::fingerprint::Fingerprint;
use super::store::DurableStore;
use crate::error::CacheError;
use crate::render::{CompositeResult, ExportEncoder};

/// Default number of composites kept in memory.
pub const DEFAULT_RENDER_CACHE_ENTRIES: usize = 10;

/// Default number of composites kept in the durable store.
pub const DEFAULT_DURABLE_CACHE_ENTRIES: usize = 20;

/// Leading bytes of every durable entry.
const ENVELOPE_MAGIC: &[u8; 4] = b"WSC1";

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeMeta {
    zoom: u8,
    tile_count: usize,
    failed_tiles: usize,
    width: u32,
    height: u32,
}

/// Serialize a composite for the durable store.
///
/// Layout: `WSC1`, a little-endian `u32` metadata length, JSON metadata,
/// then the pixels as PNG.
pub fn encode_envelope(result: &CompositeResult) -> Result<Bytes, CacheError> {
    let meta = EnvelopeMeta {
        zoom: result.zoom,
        tile_count: result.tile_count,
        failed_tiles: result.failed_tiles,
        width: result.image.width(),
        height: result.image.height(),
    };
    let meta = serde_json::to_vec(&meta).map_err(|e| CacheError::Encode(e.to_string()))?;
    let meta_len = u32::try_from(meta.len()).map_err(|e| CacheError::Encode(e.to_string()))?;
    let png = ExportEncoder::new()
        .encode_png(&result.image)
        .map_err(|e| CacheError::Encode(e.to_string()))?;

    let mut buf = BytesMut::with_capacity(8 + meta.len() + png.len());
    buf.put_slice(ENVELOPE_MAGIC);
    buf.put_u32_le(meta_len);
    buf.put_slice(&meta);
    buf.put_slice(&png);
    Ok(buf.freeze())
}

/// Parse a durable entry written by [`encode_envelope`].
///
/// Any structural problem, including a PNG whose size disagrees with the
/// metadata, is reported as [`CacheError::Corrupt`].
pub fn decode_envelope(key: &str, data: &[u8]) -> Result<CompositeResult, CacheError> {
    let corrupt = |reason: String| CacheError::Corrupt {
        key: key.to_string(),
        reason,
    };

    if data.len() < 8 || &data[..4] != ENVELOPE_MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }
    let meta_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let body = &data[8..];
    if meta_len > body.len() {
        return Err(corrupt(format!(
            "metadata length {} exceeds entry size",
            meta_len
        )));
    }

    let (meta, png) = body.split_at(meta_len);
    let meta: EnvelopeMeta =
        serde_json::from_slice(meta).map_err(|e| corrupt(format!("metadata: {}", e)))?;
    let image = ExportEncoder::new()
        .decode_png(png)
        .map_err(|e| corrupt(format!("pixels: {}", e)))?;

    if image.dimensions() != (meta.width, meta.height) {
        return Err(corrupt(format!(
            "expected {}x{} pixels, found {}x{}",
            meta.width,
            meta.height,
            image.width(),
            image.height()
        )));
    }

    Ok(CompositeResult {
        image,
        zoom: meta.zoom,
        tile_count: meta.tile_count,
        failed_tiles: meta.failed_tiles,
        cache_hit: false,
    })
}

// =============================================================================
// Render Cache
// =============================================================================

struct DurableTier {
    store: Arc<dyn DurableStore>,
    max_entries: usize,
    pending: Mutex<JoinSet<()>>,
}

/// Render cache keyed by [`Fingerprint`].
///
/// Shared between concurrent renders behind an `Arc`. Storing the same
/// fingerprint twice is harmless: the later write wins in both tiers.
pub struct RenderCache {
    memory: RwLock<LruCache<Fingerprint, Arc<CompositeResult>>>,
    capacity: usize,
    durable: Option<DurableTier>,
}

impl RenderCache {
    /// Memory-only cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RENDER_CACHE_ENTRIES)
    }

    /// Memory-only cache holding at most `capacity` composites.
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: RwLock::new(LruCache::new(cap)),
            capacity: cap.get(),
            durable: None,
        }
    }

    /// Add a durable tier bounded to `max_entries` blobs.
    pub fn with_durable(mut self, store: Arc<dyn DurableStore>, max_entries: usize) -> Self {
        self.durable = Some(DurableTier {
            store,
            max_entries: max_entries.max(1),
            pending: Mutex::new(JoinSet::new()),
        });
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Look up a composite.
    ///
    /// Falls back to the durable tier on a memory miss and promotes what it
    /// finds. Durable entries that fail to decode are deleted and reported
    /// as a miss.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<CompositeResult>> {
        {
            let mut memory = self.memory.write().await;
            if let Some(hit) = memory.get(fingerprint) {
                debug!(fingerprint = %fingerprint, "Render cache hit (memory)");
                return Some(hit.clone());
            }
        }

        let durable = self.durable.as_ref()?;
        let key = fingerprint.as_str();
        let data = match durable.store.read_bytes(key).await {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Durable cache read failed");
                return None;
            }
        };

        let decoded = tokio::task::spawn_blocking({
            let key = key.to_string();
            move || decode_envelope(&key, &data)
        })
        .await;

        match decoded {
            Ok(Ok(result)) => {
                debug!(fingerprint = %fingerprint, "Render cache hit (durable)");
                let result = Arc::new(result);
                self.memory
                    .write()
                    .await
                    .put(fingerprint.clone(), result.clone());
                Some(result)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Deleting corrupt durable cache entry");
                if let Err(e) = durable.store.delete(key).await {
                    warn!(fingerprint = %fingerprint, error = %e, "Failed to delete corrupt entry");
                }
                None
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Durable cache decode task failed");
                None
            }
        }
    }

    /// Store a composite.
    ///
    /// The memory tier is updated before returning. The durable write is
    /// spawned; its failures are logged and never reported to the caller.
    pub async fn put(&self, fingerprint: Fingerprint, result: Arc<CompositeResult>) {
        self.memory
            .write()
            .await
            .put(fingerprint.clone(), result.clone());

        let Some(durable) = &self.durable else {
            return;
        };

        let store = durable.store.clone();
        let max_entries = durable.max_entries;
        let mut pending = durable.pending.lock().await;
        while pending.try_join_next().is_some() {}

        pending.spawn(async move {
            let encoded = tokio::task::spawn_blocking(move || encode_envelope(&result)).await;
            let bytes = match encoded {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => {
                    warn!(fingerprint = %fingerprint, error = %e, "Failed to encode cache entry");
                    return;
                }
                Err(e) => {
                    warn!(fingerprint = %fingerprint, error = %e, "Cache encode task failed");
                    return;
                }
            };

            if let Err(e) = store.write_bytes(fingerprint.as_str(), bytes).await {
                warn!(fingerprint = %fingerprint, error = %e, "Durable cache write failed");
                return;
            }
            debug!(fingerprint = %fingerprint, "Render persisted");

            if let Err(e) = prune_store(store.as_ref(), max_entries).await {
                warn!(error = %e, "Durable cache prune failed");
            }
        });
    }

    /// Whether the memory tier holds `fingerprint`. Does not touch recency.
    pub async fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.memory.read().await.contains(fingerprint)
    }

    /// Drop one entry from both tiers.
    pub async fn remove(&self, fingerprint: &Fingerprint) {
        self.memory.write().await.pop(fingerprint);
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.store.delete(fingerprint.as_str()).await {
                warn!(fingerprint = %fingerprint, error = %e, "Durable cache delete failed");
            }
        }
    }

    /// Drop every entry from both tiers.
    pub async fn clear(&self) {
        self.flush().await;
        self.memory.write().await.clear();

        let Some(durable) = &self.durable else {
            return;
        };
        match durable.store.list_keys().await {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = durable.store.delete(&key).await {
                        warn!(key = %key, error = %e, "Durable cache delete failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list durable cache entries"),
        }
    }

    /// Number of composites in memory.
    pub async fn len(&self) -> usize {
        self.memory.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memory.read().await.is_empty()
    }

    /// Wait for every pending durable write.
    pub async fn flush(&self) {
        let Some(durable) = &self.durable else {
            return;
        };
        let mut pending = durable.pending.lock().await;
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Durable cache write task failed");
            }
        }
    }

    /// Trim the durable tier to its bound, dropping the oldest entries.
    ///
    /// Returns the number of entries removed. Run once at start-up so a
    /// store written with a larger bound converges.
    pub async fn prune(&self) -> Result<usize, CacheError> {
        match &self.durable {
            Some(durable) => prune_store(durable.store.as_ref(), durable.max_entries).await,
            None => Ok(0),
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}

async fn prune_store(store: &dyn DurableStore, max_entries: usize) -> Result<usize, CacheError> {
    let keys = store.list_keys().await?;
    let excess = keys.len().saturating_sub(max_entries);
    for key in &keys[..excess] {
        store.delete(key).await?;
    }
    if excess > 0 {
        debug!(removed = excess, "Pruned durable render cache");
    }
    Ok(excess)
}
