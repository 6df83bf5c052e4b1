//! End-to-end render tests against the mock provider.

use std::collections::HashSet;
use std::time::Duration;

use wallstitch::error::RenderError;
use wallstitch::geo::{to_tile_point, GeoLocation, TileIndex};
use wallstitch::render::{EffectSettings, RenderRequest};
use wallstitch::viewport::{
    resolve, Dimensions, TilePlacement, ViewportRequest, ZoomRange, MAX_SCALE,
};

use super::test_utils::{plain_request, service_for, tile_color, MockTileSource, RICHAT};

/// Placement covering output pixel `(x, y)` and the pixel's distance to the
/// nearest edge of that placement.
fn placement_at(placements: &[TilePlacement], x: i64, y: i64) -> Option<(&TilePlacement, i64)> {
    placements.iter().find_map(|p| {
        let r = p.rect;
        let right = r.x + r.width as i64;
        let bottom = r.y + r.height as i64;
        if x >= r.x && x < right && y >= r.y && y < bottom {
            let margin = (x - r.x)
                .min(right - 1 - x)
                .min(y - r.y)
                .min(bottom - 1 - y);
            Some((p, margin))
        } else {
            None
        }
    })
}

fn clipped_center(p: &TilePlacement, size: Dimensions) -> (u32, u32) {
    let x0 = p.rect.x.max(0);
    let y0 = p.rect.y.max(0);
    let x1 = (p.rect.x + p.rect.width as i64).min(size.width as i64);
    let y1 = (p.rect.y + p.rect.height as i64).min(size.height as i64);
    (((x0 + x1) / 2) as u32, ((y0 + y1) / 2) as u32)
}

// =============================================================================
// Stitching
// =============================================================================

#[tokio::test]
async fn test_richat_portrait_render() {
    let source = MockTileSource::new();
    let service = service_for(source.clone());
    let request = plain_request(RICHAT, 1080, 1920, 12);

    let resolved = resolve(&request.viewport, &ZoomRange::default()).unwrap();
    assert!(resolved.bounds.columns() >= 6);
    assert!(resolved.bounds.rows() >= 9);

    let result = service.render(&request).await.unwrap();

    assert_eq!(result.image.dimensions(), (1080, 1920));
    assert_eq!(result.zoom, 12);
    assert_eq!(result.failed_tiles, 0);
    assert!(!result.cache_hit);

    let distinct: HashSet<TileIndex> = resolved.placements().iter().map(|p| p.index).collect();
    assert_eq!(source.request_count(), distinct.len());
}

#[tokio::test]
async fn test_every_tile_lands_in_its_placement() {
    let service = service_for(MockTileSource::new());
    let request = plain_request(RICHAT, 1080, 1920, 12);
    let resolved = resolve(&request.viewport, &ZoomRange::default()).unwrap();

    let result = service.render(&request).await.unwrap();

    for placement in resolved.placements() {
        let (x, y) = clipped_center(&placement, resolved.output);
        assert_eq!(
            *result.image.get_pixel(x, y),
            tile_color(placement.index),
            "tile {} drawn in the wrong place",
            placement.index
        );
    }
}

#[tokio::test]
async fn test_center_tile_under_canvas_center() {
    let service = service_for(MockTileSource::new());
    let request = plain_request(RICHAT, 1080, 1920, 12);

    let result = service.render(&request).await.unwrap();

    let center = to_tile_point(RICHAT.latitude, RICHAT.longitude, 12);
    let expected = TileIndex {
        x: center.x.floor() as u32,
        y: center.y.floor() as u32,
        zoom: 12,
    };
    assert_eq!(*result.image.get_pixel(540, 960), tile_color(expected));
}

#[tokio::test]
async fn test_antimeridian_tiles_fetched_once() {
    let source = MockTileSource::new();
    let service = service_for(source.clone());
    let request = plain_request(GeoLocation::new(0.0, 179.9), 1024, 512, 3);

    let result = service.render(&request).await.unwrap();
    assert_eq!(result.failed_tiles, 0);

    let requested = source.requested();
    assert!(requested.iter().all(|index| index.x < 8));
    let distinct: HashSet<TileIndex> = requested.iter().copied().collect();
    assert_eq!(distinct.len(), requested.len());
}

// =============================================================================
// Graceful Degradation
// =============================================================================

#[tokio::test]
async fn test_failed_tile_left_black_and_counted() {
    let source = MockTileSource::new();
    let service = service_for(source.clone());
    let request = plain_request(RICHAT, 1080, 1920, 12);
    let resolved = resolve(&request.viewport, &ZoomRange::default()).unwrap();
    let placements = resolved.placements();

    let (broken, _) = placement_at(&placements, 540, 960).unwrap();
    source.fail_tile(broken.index);

    let result = service.render(&request).await.unwrap();
    assert_eq!(result.failed_tiles, 1);
    assert_eq!(result.tile_count, placements.len());
    assert_eq!(result.image.get_pixel(540, 960).0, [0, 0, 0, 255]);

    // Neighbours still render
    let neighbour = placements
        .iter()
        .find(|p| p.index != broken.index)
        .unwrap();
    let (x, y) = clipped_center(neighbour, resolved.output);
    assert_eq!(*result.image.get_pixel(x, y), tile_color(neighbour.index));
}

#[tokio::test]
async fn test_partial_render_retried_next_time() {
    let source = MockTileSource::new();
    let service = service_for(source.clone());
    let request = plain_request(RICHAT, 540, 960, 12);
    let resolved = resolve(&request.viewport, &ZoomRange::default()).unwrap();
    let broken = resolved.placements()[0].index;
    source.fail_tile(broken);

    let first = service.render(&request).await.unwrap();
    assert_eq!(first.failed_tiles, 1);
    let after_first = source.request_count();

    let second = service.render(&request).await.unwrap();
    assert!(!second.cache_hit);
    assert_eq!(second.failed_tiles, 1);
    // Only the failed tile is asked for again; the rest come from the tile cache
    assert_eq!(source.request_count(), after_first + 1);
}

#[tokio::test]
async fn test_total_outage_is_an_error() {
    let source = MockTileSource::new();
    source.fail_all(true);
    let service = service_for(source);

    let result = service.render(&plain_request(RICHAT, 540, 960, 12)).await;
    assert!(matches!(result, Err(RenderError::NoTiles { .. })));
}

// =============================================================================
// Request Limits
// =============================================================================

#[tokio::test]
async fn test_oversized_scale_rejected_before_fetch() {
    let source = MockTileSource::new();
    let service = service_for(source.clone());
    let viewport = ViewportRequest::new(RICHAT, Dimensions::new(100, 100), 12).with_scale(1e4);

    let result = service
        .render(&RenderRequest::new(viewport, EffectSettings::none()))
        .await;
    assert!(matches!(result, Err(RenderError::InvalidRequest(_))));
    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn test_tiny_scale_rejected_before_fetch() {
    let source = MockTileSource::new();
    let service = service_for(source.clone());
    let viewport =
        ViewportRequest::new(RICHAT, Dimensions::new(1080, 1920), 19).with_scale(1e-12);

    let result = service
        .render(&RenderRequest::new(viewport, EffectSettings::none()))
        .await;
    assert!(matches!(result, Err(RenderError::InvalidRequest(_))));
    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn test_maximum_magnification_renders() {
    let service = service_for(MockTileSource::new());
    let viewport = ViewportRequest::new(RICHAT, Dimensions::new(100, 100), 12)
        .with_scale(MAX_SCALE)
        .with_reference(Dimensions::new(1, 1));
    let resolved = resolve(&viewport, &ZoomRange::default()).unwrap();
    let placements = resolved.placements();
    let (center, _) = placement_at(&placements, 50, 50).unwrap();
    assert!(center.rect.width > 1_000_000);

    let result = service
        .render(&RenderRequest::new(viewport, EffectSettings::none()))
        .await
        .unwrap();

    assert_eq!(result.image.dimensions(), (100, 100));
    assert_eq!(result.failed_tiles, 0);
    assert_eq!(*result.image.get_pixel(50, 50), tile_color(center.index));
}

// =============================================================================
// Preview / Export Consistency
// =============================================================================

#[tokio::test]
async fn test_export_shows_preview_area() {
    let service = service_for(MockTileSource::new());
    let zooms = ZoomRange::default();

    let preview_viewport = ViewportRequest::new(RICHAT, Dimensions::new(270, 480), 12)
        .with_pan(40.0, -25.0)
        .with_scale(1.0);
    let export_viewport = ViewportRequest {
        output: Dimensions::new(540, 960),
        ..preview_viewport
            .clone()
            .with_reference(Dimensions::new(270, 480))
    };

    let preview = service
        .render(&RenderRequest::new(
            preview_viewport.clone(),
            EffectSettings::none(),
        ))
        .await
        .unwrap();
    let export = service
        .render(&RenderRequest::new(
            export_viewport.clone(),
            EffectSettings::none(),
        ))
        .await
        .unwrap();

    let preview_resolved = resolve(&preview_viewport, &zooms).unwrap();
    let export_resolved = resolve(&export_viewport, &zooms).unwrap();
    assert_eq!(
        preview_resolved.adjusted_center,
        export_resolved.adjusted_center
    );

    let placements = preview_resolved.placements();
    let mut compared = 0;
    for fy in [0.1, 0.3, 0.5, 0.7, 0.9] {
        for fx in [0.1, 0.5, 0.9] {
            let px = (fx * 270.0) as i64;
            let py = (fy * 480.0) as i64;
            let Some((_, margin)) = placement_at(&placements, px, py) else {
                continue;
            };
            if margin < 2 {
                continue;
            }
            assert_eq!(
                preview.image.get_pixel(px as u32, py as u32),
                export.image.get_pixel(2 * px as u32, 2 * py as u32),
                "preview ({}, {}) differs from export",
                px,
                py
            );
            compared += 1;
        }
    }
    assert!(compared > 5);
}

#[tokio::test]
async fn test_detail_zoom_draws_child_tiles() {
    let service = service_for(MockTileSource::new());
    let zooms = ZoomRange::default();

    let preview_viewport = ViewportRequest::new(RICHAT, Dimensions::new(270, 480), 12);
    let export_viewport = ViewportRequest::new(RICHAT, Dimensions::new(540, 960), 12)
        .with_reference(Dimensions::new(270, 480))
        .with_detail_zoom(1);

    let export = service
        .render(&RenderRequest::new(
            export_viewport.clone(),
            EffectSettings::none(),
        ))
        .await
        .unwrap();
    assert_eq!(export.zoom, 13);

    let preview_resolved = resolve(&preview_viewport, &zooms).unwrap();
    let export_resolved = resolve(&export_viewport, &zooms).unwrap();
    assert_eq!(
        preview_resolved.ground_extent(),
        export_resolved.ground_extent()
    );

    let preview_placements = preview_resolved.placements();
    let export_placements = export_resolved.placements();
    for (px, py) in [(135, 240), (40, 60), (230, 420)] {
        let (parent, margin) = placement_at(&preview_placements, px, py).unwrap();
        if margin < 2 {
            continue;
        }
        let (child, _) = placement_at(&export_placements, 2 * px, 2 * py).unwrap();
        assert_eq!(child.index.zoom, 13);
        assert_eq!(child.index.x / 2, parent.index.x);
        assert_eq!(child.index.y / 2, parent.index.y);
        assert_eq!(
            *export.image.get_pixel(2 * px as u32, 2 * py as u32),
            tile_color(child.index)
        );
    }
}

// =============================================================================
// Caching and Concurrency
// =============================================================================

#[tokio::test]
async fn test_repeat_render_served_from_cache() {
    let source = MockTileSource::new();
    let service = service_for(source.clone());
    let request = plain_request(RICHAT, 540, 960, 12).with_location_id("richat");

    let first = service.render(&request).await.unwrap();
    let fetched = source.request_count();

    let second = service.render(&request).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(source.request_count(), fetched);
    assert_eq!(first.image, second.image);

    // Same identity and zoom, different look: a miss
    let darker = RenderRequest {
        settings: EffectSettings::none().with_brightness(0.5),
        ..request.clone()
    };
    let third = service.render(&darker).await.unwrap();
    assert!(!third.cache_hit);
}

#[tokio::test]
async fn test_concurrent_renders_share_tile_fetches() {
    let source = MockTileSource::new().with_delay(Duration::from_millis(20));
    let service = service_for(source.clone());
    let request = plain_request(RICHAT, 540, 960, 12);
    let resolved = resolve(&request.viewport, &ZoomRange::default()).unwrap();
    let distinct: HashSet<TileIndex> = resolved.placements().iter().map(|p| p.index).collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let request = request.clone();
            tokio::spawn(async move { service.render(&request).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.failed_tiles, 0);
    }

    assert_eq!(source.request_count(), distinct.len());
}
