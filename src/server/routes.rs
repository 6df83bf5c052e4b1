//! Router for the wallstitch HTTP API.
//!
//! ```text
//! GET    /health    liveness and version
//! GET    /render    render a viewport as JPEG
//! DELETE /cache     drop every cached render
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use wallstitch::fetch::{HttpTileSource, UrlTemplate};
//! use wallstitch::render::WallpaperService;
//! use wallstitch::server::{create_router, RouterConfig};
//!
//! let service = Arc::new(WallpaperService::new(HttpTileSource::new(UrlTemplate::default())?));
//! let router = create_router(service, RouterConfig::new().with_cache_max_age(600));
//! axum::serve(tokio::net::TcpListener::bind("127.0.0.1:3000").await?, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get},
    Router,
};
use http::header::{HeaderName, CACHE_CONTROL, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer, ExposeHeaders};
use tower_http::trace::TraceLayer;

use super::handlers::{clear_cache_handler, health_handler, render_handler, AppState};
use crate::fetch::TileSource;
use crate::render::{WallpaperService, PREVIEW_JPEG_QUALITY};

/// Response headers a cross-origin client may read.
const EXPOSED_HEADERS: [&str; 4] = [
    "x-render-cache-hit",
    "x-render-zoom",
    "x-render-tiles",
    "x-render-failed-tiles",
];

// =============================================================================
// Router Configuration
// =============================================================================

/// Settings for [`create_router`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Origins allowed to call the API; `None` allows any
    pub cors_origins: Option<Vec<String>>,

    /// `max-age` sent with rendered images, in seconds
    pub cache_max_age: u32,

    /// JPEG quality when the request does not name one
    pub jpeg_quality: u8,

    /// Add a `TraceLayer` around every route
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Any origin, one hour of client caching, preview quality, tracing on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            jpeg_quality: PREVIEW_JPEG_QUALITY,
            enable_tracing: true,
        }
    }

    /// Restrict CORS to `origins`. An empty list blocks every cross-origin
    /// caller.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router around a shared render service.
pub fn create_router<S>(service: Arc<WallpaperService<S>>, config: RouterConfig) -> Router
where
    S: TileSource + 'static,
{
    let state = AppState::new(service)
        .with_cache_max_age(config.cache_max_age)
        .with_jpeg_quality(config.jpeg_quality);

    let router = Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/render", get(render_handler::<S>))
        .route("/cache", delete(clear_cache_handler::<S>))
        .with_state(state)
        .layer(cors_layer(config.cors_origins.as_deref()));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// CORS for the render API. Unparseable origins are skipped.
fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let exposed: Vec<HeaderName> = EXPOSED_HEADERS
        .iter()
        .map(|&name| HeaderName::from_static(name))
        .chain([CACHE_CONTROL])
        .collect();

    let allow_origin = match origins {
        None => AllowOrigin::any(),
        Some(origins) => AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok())),
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers(ExposeHeaders::list(exposed))
        .allow_origin(allow_origin)
        .max_age(Duration::from_secs(24 * 60 * 60))
}

// =============================================================================
// Tests
// =============================================================================
