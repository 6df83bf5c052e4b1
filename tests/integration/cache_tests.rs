//! Render cache tests with a disk-backed durable tier.

use std::sync::Arc;

use tempfile::TempDir;

use wallstitch::cache::{decode_envelope, DiskStore, DurableStore, Fingerprint, RenderCache};
use wallstitch::geo::GeoLocation;
use wallstitch::render::EffectSettings;

use super::test_utils::{plain_request, service_with_cache, MockTileSource, RICHAT};

async fn disk_cache(dir: &TempDir, max_entries: usize) -> (RenderCache, Arc<DiskStore>) {
    let store = Arc::new(DiskStore::open(dir.path()).await.unwrap());
    let cache = RenderCache::new().with_durable(store.clone(), max_entries);
    (cache, store)
}

#[tokio::test]
async fn test_render_survives_restart() {
    let dir = TempDir::new().unwrap();
    let request = plain_request(RICHAT, 540, 960, 12);

    let first = {
        let (cache, _) = disk_cache(&dir, 20).await;
        let service = service_with_cache(MockTileSource::new(), cache);
        let result = service.render(&request).await.unwrap();
        service.cache().flush().await;
        result
    };

    let source = MockTileSource::new();
    let (cache, _) = disk_cache(&dir, 20).await;
    let service = service_with_cache(source.clone(), cache);

    let second = service.render(&request).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(source.request_count(), 0);
    assert_eq!(first.image, second.image);
    assert_eq!(second.zoom, first.zoom);
    assert_eq!(second.tile_count, first.tile_count);

    // Promoted into memory
    let fingerprint = Fingerprint::compute(&request.location_identity(), 12, &request.settings);
    assert!(service.cache().contains(&fingerprint).await);
}

#[tokio::test]
async fn test_corrupt_entry_deleted_and_rerendered() {
    let dir = TempDir::new().unwrap();
    let request = plain_request(RICHAT, 540, 960, 12);
    let fingerprint = Fingerprint::compute(&request.location_identity(), 12, &request.settings);

    let (cache, store) = disk_cache(&dir, 20).await;
    store
        .write_bytes(fingerprint.as_str(), bytes::Bytes::from_static(b"WSC1 garbage"))
        .await
        .unwrap();

    let source = MockTileSource::new();
    let service = service_with_cache(source.clone(), cache);

    let result = service.render(&request).await.unwrap();
    assert!(!result.cache_hit);
    assert!(source.request_count() > 0);

    // The fresh render replaced the corrupt blob
    service.cache().flush().await;
    let data = store.read_bytes(fingerprint.as_str()).await.unwrap().unwrap();
    let decoded = decode_envelope(fingerprint.as_str(), &data).unwrap();
    assert_eq!(decoded.image, result.image);
}

#[tokio::test]
async fn test_durable_tier_stays_bounded() {
    let dir = TempDir::new().unwrap();
    let (cache, store) = disk_cache(&dir, 2).await;
    let service = service_with_cache(MockTileSource::new(), cache);

    for longitude in [-11.4, 2.35, 139.7] {
        let request = plain_request(GeoLocation::new(21.0, longitude), 256, 256, 10);
        service.render(&request).await.unwrap();
    }
    service.cache().flush().await;

    assert_eq!(store.list_keys().await.unwrap().len(), 2);
    assert_eq!(service.cache().len().await, 3);
}

#[tokio::test]
async fn test_prune_converges_to_smaller_bound() {
    let dir = TempDir::new().unwrap();
    {
        let (cache, _) = disk_cache(&dir, 10).await;
        let service = service_with_cache(MockTileSource::new(), cache);
        for zoom in 8..13 {
            service
                .render(&plain_request(RICHAT, 256, 256, zoom))
                .await
                .unwrap();
        }
        service.cache().flush().await;
    }

    let (cache, store) = disk_cache(&dir, 2).await;
    assert_eq!(store.list_keys().await.unwrap().len(), 5);
    assert_eq!(cache.prune().await.unwrap(), 3);
    assert_eq!(store.list_keys().await.unwrap().len(), 2);
    assert_eq!(cache.prune().await.unwrap(), 0);
}

#[tokio::test]
async fn test_clear_empties_both_tiers() {
    let dir = TempDir::new().unwrap();
    let (cache, store) = disk_cache(&dir, 20).await;
    let source = MockTileSource::new();
    let service = service_with_cache(source.clone(), cache);
    let request = plain_request(RICHAT, 256, 256, 10);

    service.render(&request).await.unwrap();
    service.clear_cache().await;

    assert!(service.cache().is_empty().await);
    assert!(store.list_keys().await.unwrap().is_empty());

    let again = service.render(&request).await.unwrap();
    assert!(!again.cache_hit);
}

#[tokio::test]
async fn test_effects_are_part_of_identity_on_disk() {
    let dir = TempDir::new().unwrap();
    let plain = plain_request(RICHAT, 256, 256, 10);
    let blurred = wallstitch::render::RenderRequest {
        settings: EffectSettings::none().with_blur(3.0),
        ..plain.clone()
    };

    {
        let (cache, _) = disk_cache(&dir, 20).await;
        let service = service_with_cache(MockTileSource::new(), cache);
        service.render(&plain).await.unwrap();
        service.cache().flush().await;
    }

    let (cache, _) = disk_cache(&dir, 20).await;
    let service = service_with_cache(MockTileSource::new(), cache);
    assert!(!service.render(&blurred).await.unwrap().cache_hit);
    assert!(service.render(&plain).await.unwrap().cache_hit);
}
