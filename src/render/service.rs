//! Render orchestration.
//!
//! [`WallpaperService`] is the entry point for render requests. It ties the
//! resolver, fetcher, compositor and render cache together:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        WallpaperService                          │
//! │  render()                                                        │
//! │   1. Validate         4. Fetch tiles (cache-first, ≤ N parallel) │
//! │   2. Resolve viewport 5. Composite + effects                     │
//! │   3. Check cache      6. Cache & return                          │
//! │        │                     │                      │            │
//! │        ▼                     ▼                      ▼            │
//! │  ┌─────────────┐     ┌──────────────┐       ┌──────────────┐     │
//! │  │ RenderCache │     │ TileFetcher  │       │  Compositor  │     │
//! │  └─────────────┘     └──────────────┘       └──────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`RenderSession`] adds last-request-wins semantics on top, for callers
//! that replace their view faster than renders complete.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::compositor::{CompositeResult, Compositor};
use super::effects::EffectSettings;
use super::encoder::{ExportEncoder, ExportFormat};
use crate::cache::{Fingerprint, RenderCache};
use crate::error::{RenderError, TileFetchError};
use crate::fetch::{TileFetcher, TileResult, TileSource};
use crate::viewport::{resolve, Dimensions, ResolvedViewport, TilePlacement, ViewportRequest, ZoomRange};

// =============================================================================
// Render Request
// =============================================================================

/// Everything one render call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Geometry of the render
    pub viewport: ViewportRequest,

    /// Cosmetic post-processing
    pub settings: EffectSettings,

    /// Caller-chosen identity of the location (for example a curated point
    /// of interest). Defaults to the center coordinate.
    pub location_id: Option<String>,
}

impl RenderRequest {
    pub fn new(viewport: ViewportRequest, settings: EffectSettings) -> Self {
        Self {
            viewport,
            settings,
            location_id: None,
        }
    }

    pub fn with_location_id(mut self, id: impl Into<String>) -> Self {
        self.location_id = Some(id.into());
        self
    }

    /// Identity used in the render fingerprint.
    pub fn location_identity(&self) -> String {
        match &self.location_id {
            Some(id) => id.clone(),
            None => format!(
                "{:.6},{:.6}",
                self.viewport.center.latitude, self.viewport.center.longitude
            ),
        }
    }

    /// Only untransformed renders may be served from or stored in the cache.
    pub fn is_cacheable(&self) -> bool {
        self.viewport.is_untransformed()
    }
}

// =============================================================================
// Wallpaper Service
// =============================================================================

/// Renders geographic viewports into finished images.
///
/// Holds the process-wide tile and render caches, so one instance should be
/// shared (behind an `Arc`) by every caller.
pub struct WallpaperService<S: TileSource> {
    fetcher: TileFetcher<S>,
    compositor: Compositor,
    cache: RenderCache,
    zooms: ZoomRange,
    encoder: ExportEncoder,
}

impl<S: TileSource> WallpaperService<S> {
    /// Service with default fetcher, cache and zoom range.
    pub fn new(source: S) -> Self {
        Self::with_components(
            TileFetcher::new(source),
            RenderCache::new(),
            ZoomRange::default(),
        )
    }

    pub fn with_components(fetcher: TileFetcher<S>, cache: RenderCache, zooms: ZoomRange) -> Self {
        Self {
            fetcher,
            compositor: Compositor::new(),
            cache,
            zooms,
            encoder: ExportEncoder::new(),
        }
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn fetcher(&self) -> &TileFetcher<S> {
        &self.fetcher
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn zooms(&self) -> ZoomRange {
        self.zooms
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Render without a cancellation handle.
    pub async fn render(&self, request: &RenderRequest) -> Result<CompositeResult, RenderError> {
        self.render_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Render a request, giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`RenderError::InvalidRequest`] before any network activity
    /// - [`RenderError::Cancelled`] if `cancel` fired
    /// - [`RenderError::NoTiles`] if every tile failed
    /// - [`RenderError::Allocation`] if the canvas cannot be allocated
    ///
    /// Individual tile failures are not errors: they are filled with the
    /// background and counted in [`CompositeResult::failed_tiles`].
    pub async fn render_with_cancel(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<CompositeResult, RenderError> {
        request.settings.validate()?;
        let resolved = resolve(&request.viewport, &self.zooms)?;
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let fingerprint = request.is_cacheable().then(|| {
            Fingerprint::compute(
                &request.location_identity(),
                resolved.zoom,
                &request.settings,
            )
        });

        if let Some(fingerprint) = &fingerprint {
            if let Some(hit) = self.cache.get(fingerprint).await {
                return self.from_cached(&hit, request.viewport.output);
            }
        }

        let result = self
            .composite_viewport(&resolved, &request.settings, cancel)
            .await?;

        info!(
            center = %resolved.adjusted_center,
            zoom = result.zoom,
            width = resolved.output.width,
            height = resolved.output.height,
            tiles = result.tile_count,
            failed = result.failed_tiles,
            "Rendered viewport"
        );

        // Partial renders are not cached so a transient outage does not stick.
        if let Some(fingerprint) = fingerprint {
            if result.failed_tiles == 0 {
                self.cache.put(fingerprint, Arc::new(result.clone())).await;
            }
        }

        Ok(result)
    }

    /// Render and encode for export.
    pub async fn render_export(
        &self,
        request: &RenderRequest,
        format: ExportFormat,
    ) -> Result<(CompositeResult, Bytes), RenderError> {
        let result = self.render(request).await?;
        let bytes = self.encoder.encode(&result.image, format)?;
        Ok((result, bytes))
    }

    /// Encode an already rendered composite.
    pub fn encode(&self, result: &CompositeResult, format: ExportFormat) -> Result<Bytes, RenderError> {
        self.encoder.encode(&result.image, format)
    }

    /// Drop every cached render (both tiers). Tiles stay cached.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn composite_viewport(
        &self,
        resolved: &ResolvedViewport,
        settings: &EffectSettings,
        cancel: &CancellationToken,
    ) -> Result<CompositeResult, RenderError> {
        let placements = resolved.placements();
        let indices: Vec<_> = placements.iter().map(|p| p.index).collect();

        debug!(
            fetch_zoom = resolved.fetch_zoom,
            bounds = ?resolved.bounds,
            placements = placements.len(),
            "Fetching viewport tiles"
        );
        let fetched = self.fetcher.fetch_many(&indices, cancel).await;
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let tiles: Vec<(TilePlacement, TileResult)> = placements
            .into_iter()
            .map(|placement| {
                let tile = fetched
                    .get(&placement.index)
                    .cloned()
                    .unwrap_or(Err(TileFetchError::Cancelled));
                (placement, tile)
            })
            .collect();

        if tiles.iter().all(|(_, tile)| tile.is_err()) {
            return Err(RenderError::NoTiles {
                attempted: tiles.len(),
            });
        }

        self.compositor
            .composite(resolved.output, resolved.fetch_zoom, &tiles, settings)
    }

    fn from_cached(
        &self,
        hit: &CompositeResult,
        output: Dimensions,
    ) -> Result<CompositeResult, RenderError> {
        Ok(CompositeResult {
            image: self.compositor.fit_to(&hit.image, output)?,
            zoom: hit.zoom,
            tile_count: hit.tile_count,
            failed_tiles: hit.failed_tiles,
            cache_hit: true,
        })
    }
}

// =============================================================================
// Render Session
// =============================================================================

/// Last-request-wins wrapper around a shared [`WallpaperService`].
///
/// Every [`render`](Self::render) bumps a generation counter and cancels the
/// render before it. A render that finishes after a newer one started
/// reports [`RenderError::Superseded`] instead of its pixels.
pub struct RenderSession<S: TileSource> {
    service: Arc<WallpaperService<S>>,
    generation: AtomicU64,
    current: Mutex<CancellationToken>,
}

impl<S: TileSource> RenderSession<S> {
    pub fn new(service: Arc<WallpaperService<S>>) -> Self {
        Self {
            service,
            generation: AtomicU64::new(0),
            current: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn service(&self) -> &Arc<WallpaperService<S>> {
        &self.service
    }

    /// Generation of the most recently started render.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a render, superseding any render still in progress.
    pub async fn render(&self, request: &RenderRequest) -> Result<CompositeResult, RenderError> {
        let token = CancellationToken::new();
        let generation = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            current.cancel();
            *current = token.clone();
            generation
        };

        let result = self.service.render_with_cancel(request, &token).await;

        let latest = self.generation();
        if latest != generation {
            debug!(generation, latest, "Discarding superseded render");
            return Err(RenderError::Superseded { generation: latest });
        }
        result
    }

    /// Cancel the render in progress, if any.
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}
