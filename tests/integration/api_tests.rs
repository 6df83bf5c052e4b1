//! HTTP API tests.
//!
//! Drives the router with `oneshot` against a mock tile provider.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use wallstitch::geo::TileIndex;
use wallstitch::server::{create_router, RouterConfig};

use super::test_utils::{is_valid_jpeg, service_for, MockTileSource};

const RICHAT_QUERY: &str = "lat=21.1269&lon=-11.4016&zoom=12&width=270&height=480";

fn router_for(source: MockTileSource) -> Router {
    create_router(
        service_for(source),
        RouterConfig::new()
            .with_tracing(false)
            .with_cache_max_age(600),
    )
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = router_for(MockTileSource::new());

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["cached_renders"], 0);
    assert_eq!(json["durable_cache"], false);

    get(&router, &format!("/render?{}", RICHAT_QUERY)).await;
    let json = body_json(get(&router, "/health").await).await;
    assert_eq!(json["cached_renders"], 1);
}

// =============================================================================
// Render
// =============================================================================

#[tokio::test]
async fn test_render_returns_jpeg() {
    let router = router_for(MockTileSource::new());

    let response = get(&router, &format!("/render?{}", RICHAT_QUERY)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/jpeg");
    assert_eq!(header(&response, "cache-control"), "public, max-age=600");
    assert_eq!(header(&response, "x-render-cache-hit"), "false");
    assert_eq!(header(&response, "x-render-zoom"), "12");
    assert_eq!(header(&response, "x-render-failed-tiles"), "0");
    assert!(header(&response, "x-render-tiles").parse::<usize>().unwrap() > 0);

    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body));

    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (270, 480));
}

#[tokio::test]
async fn test_second_render_is_cache_hit() {
    let source = MockTileSource::new();
    let router = router_for(source.clone());
    let uri = format!("/render?{}", RICHAT_QUERY);

    let first = get(&router, &uri).await;
    assert_eq!(header(&first, "x-render-cache-hit"), "false");
    let fetched = source.request_count();

    let second = get(&router, &uri).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-render-cache-hit"), "true");
    assert_eq!(source.request_count(), fetched);
}

#[tokio::test]
async fn test_zoom_offset_and_detail_render() {
    let router = router_for(MockTileSource::new());

    let uri = "/render?lat=21.1269&lon=-11.4016&zoom=12&zoom_offset=-2&width=540&height=960\
               &ref_width=270&ref_height=480&pan_x=15&scale=1.3&quality=80";
    let response = get(&router, uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-render-zoom"), "10");
    assert_eq!(header(&response, "x-render-cache-hit"), "false");
}

#[tokio::test]
async fn test_partial_failure_still_renders() {
    let source = MockTileSource::new();
    source.fail_tile(TileIndex {
        x: 1918,
        y: 1799,
        zoom: 12,
    });
    let router = router_for(source);

    let response = get(&router, &format!("/render?{}", RICHAT_QUERY)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-render-failed-tiles"), "1");
    assert!(is_valid_jpeg(&body_bytes(response).await));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_missing_parameters_rejected() {
    let router = router_for(MockTileSource::new());

    let response = get(&router, "/render?lat=21.1&lon=-11.4").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_values_rejected() {
    let source = MockTileSource::new();
    let router = router_for(source.clone());

    for query in [
        "lat=95&lon=0&zoom=10&width=100&height=100",
        "lat=0&lon=0&zoom=10&width=0&height=100",
        "lat=0&lon=0&zoom=10&width=100&height=100&scale=0",
        "lat=0&lon=0&zoom=10&width=100&height=100&quality=0",
        "lat=0&lon=0&zoom=10&width=100&height=100&ref_width=50",
        "lat=0&lon=0&zoom=10&width=100&height=100&overlay_color=nothex",
        "lat=0&lon=0&zoom=10&width=100&height=100&overlay_opacity=2",
        "lat=0&lon=0&zoom=10&width=9000&height=100",
        "lat=0&lon=0&zoom=10&width=100&height=100&scale=1e4",
        "lat=0&lon=0&zoom=19&width=1080&height=1920&scale=1e-12",
        "lat=0&lon=0&zoom=10&width=100&height=100&ref_width=100000&ref_height=100000",
        "lat=0&lon=0&zoom=10&width=100&height=100&ref_width=8192&ref_height=8192&scale=0.001",
    ] {
        let response = get(&router, &format!("/render?{}", query)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", query);

        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_request", "{}", query);
        assert_eq!(json["status"], 400);
    }

    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn test_provider_outage_is_bad_gateway() {
    let source = MockTileSource::new();
    source.fail_all(true);
    let router = router_for(source);

    let response = get(&router, &format!("/render?{}", RICHAT_QUERY)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = body_json(response).await;
    assert_eq!(json["error"], "no_tiles");
}

// =============================================================================
// Cache Control
// =============================================================================

#[tokio::test]
async fn test_clear_cache_endpoint() {
    let router = router_for(MockTileSource::new());
    let uri = format!("/render?{}", RICHAT_QUERY);

    get(&router, &uri).await;
    assert_eq!(header(&get(&router, &uri).await, "x-render-cache-hit"), "true");

    let request = Request::builder()
        .method("DELETE")
        .uri("/cache")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(&router, &uri).await;
    assert_eq!(header(&response, "x-render-cache-hit"), "false");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let router = router_for(MockTileSource::new());

    let response = get(&router, "/tiles/12/1918/1802").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
