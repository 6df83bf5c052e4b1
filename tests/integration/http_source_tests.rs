//! HttpTileSource tests against a local tile provider.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use wallstitch::error::TileFetchError;
use wallstitch::fetch::{HttpSourceConfig, HttpTileSource, TileFetcher, TileSource, UrlTemplate};
use wallstitch::geo::TileIndex;
use wallstitch::render::WallpaperService;

use super::test_utils::{plain_request, png_tile, tile_color, RICHAT};

#[derive(Clone, Default)]
struct Provider {
    hits: Arc<AtomicUsize>,
    user_agent: Arc<std::sync::Mutex<Option<String>>>,
}

/// Serves `/{z}/{y}/{x}`, ESRI order. Column 0 always fails.
async fn tile(
    State(provider): State<Provider>,
    Path((z, y, x)): Path<(u8, u32, u32)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    provider.hits.fetch_add(1, Ordering::SeqCst);
    *provider.user_agent.lock().unwrap() = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if x == 0 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    let body = png_tile(tile_color(TileIndex { x, y, zoom: z }));
    ([(header::CONTENT_TYPE, "image/png")], body).into_response()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn garbage() -> &'static str {
    "definitely not an image"
}

async fn spawn_provider() -> (SocketAddr, Provider) {
    let provider = Provider::default();
    let app = Router::new()
        .route("/tiles/{z}/{y}/{x}", get(tile))
        .route("/slow/{z}/{x}/{y}", get(slow))
        .route("/garbage/{z}/{x}/{y}", get(garbage))
        .with_state(provider.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, provider)
}

fn source_for(addr: SocketAddr, path: &str) -> HttpTileSource {
    let template = UrlTemplate::new(format!("http://{}/{}", addr, path)).unwrap();
    let config = HttpSourceConfig {
        read_timeout: Duration::from_millis(300),
        ..HttpSourceConfig::default()
    };
    HttpTileSource::with_config(template, config).unwrap()
}

#[tokio::test]
async fn test_fetches_tile_bytes() {
    let (addr, provider) = spawn_provider().await;
    let source = source_for(addr, "tiles/{z}/{y}/{x}");
    let index = TileIndex {
        x: 3,
        y: 5,
        zoom: 4,
    };

    let bytes = source.fetch(index).await.unwrap();
    assert_eq!(bytes, png_tile(tile_color(index)));
    assert_eq!(provider.hits.load(Ordering::SeqCst), 1);

    let agent = provider.user_agent.lock().unwrap().clone().unwrap();
    assert!(agent.starts_with("wallstitch/"));
}

#[tokio::test]
async fn test_error_status_reported() {
    let (addr, _) = spawn_provider().await;
    let source = source_for(addr, "tiles/{z}/{y}/{x}");

    let err = source
        .fetch(TileIndex {
            x: 0,
            y: 1,
            zoom: 4,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TileFetchError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let (addr, _) = spawn_provider().await;
    let source = source_for(addr, "slow/{z}/{x}/{y}");

    let err = source
        .fetch(TileIndex {
            x: 1,
            y: 1,
            zoom: 4,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TileFetchError::Timeout { .. } | TileFetchError::Connection(_)
    ));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = source_for(addr, "tiles/{z}/{y}/{x}");
    let err = source
        .fetch(TileIndex {
            x: 1,
            y: 1,
            zoom: 4,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TileFetchError::Connection(_)));
}

#[tokio::test]
async fn test_undecodable_tile_is_a_failure() {
    let (addr, _) = spawn_provider().await;
    let fetcher = TileFetcher::new(source_for(addr, "garbage/{z}/{x}/{y}"));

    let result = fetcher
        .fetch_tile(TileIndex {
            x: 1,
            y: 1,
            zoom: 4,
        })
        .await;
    assert!(matches!(result, Err(TileFetchError::Decode(_))));
    assert!(fetcher.cache().is_empty().await);
}

#[tokio::test]
async fn test_render_over_http() {
    let (addr, provider) = spawn_provider().await;
    let service = WallpaperService::new(source_for(addr, "tiles/{z}/{y}/{x}"));

    let result = service
        .render(&plain_request(RICHAT, 270, 480, 12))
        .await
        .unwrap();

    assert_eq!(result.failed_tiles, 0);
    assert_eq!(result.image.dimensions(), (270, 480));
    assert_eq!(provider.hits.load(Ordering::SeqCst), result.tile_count);
}
