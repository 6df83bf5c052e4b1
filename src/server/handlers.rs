//! Axum handlers for the render API.
//!
//! Query parameters are turned into a [`RenderRequest`] here; everything
//! after that is the service's business. Errors leave as JSON with a status
//! chosen by [`RenderError`]'s variant.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::RenderError;
use crate::fetch::TileSource;
use crate::geo::GeoLocation;
use crate::output::effective_zoom;
use crate::render::{
    is_valid_quality, parse_hex_color, EffectSettings, ExportFormat, RenderRequest,
    WallpaperService, DEFAULT_OVERLAY_OPACITY, PREVIEW_JPEG_QUALITY,
};
use crate::viewport::{Dimensions, ViewportRequest};

/// Largest width or height accepted by `/render`.
pub const MAX_RENDER_DIMENSION: u32 = 8192;

// =============================================================================
// Application State
// =============================================================================

/// State shared by every handler.
pub struct AppState<S: TileSource> {
    /// The render service, shared by every request
    pub service: Arc<WallpaperService<S>>,

    /// Cache-Control max-age in seconds for rendered images
    pub cache_max_age: u32,

    /// JPEG quality when the request does not name one
    pub jpeg_quality: u8,
}

impl<S: TileSource> AppState<S> {
    pub fn new(service: Arc<WallpaperService<S>>) -> Self {
        Self {
            service,
            cache_max_age: 3600,
            jpeg_quality: PREVIEW_JPEG_QUALITY,
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}

impl<S: TileSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache_max_age: self.cache_max_age,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for `/render`.
#[derive(Debug, Deserialize)]
pub struct RenderQueryParams {
    /// Center latitude in degrees
    pub lat: f64,

    /// Center longitude in degrees
    pub lon: f64,

    /// Base zoom of the location
    pub zoom: i32,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Added to `zoom` before clamping
    #[serde(default)]
    pub zoom_offset: i32,

    #[serde(default)]
    pub pan_x: f64,

    #[serde(default)]
    pub pan_y: f64,

    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Reference screen width; requires `ref_height`
    #[serde(default)]
    pub ref_width: Option<u32>,

    /// Reference screen height; requires `ref_width`
    #[serde(default)]
    pub ref_height: Option<u32>,

    #[serde(default = "default_brightness")]
    pub brightness: f32,

    #[serde(default)]
    pub blur: f32,

    #[serde(default = "default_overlay_opacity")]
    pub overlay_opacity: f32,

    /// `RRGGBB` or `AARRGGBB`, with or without `#`
    #[serde(default)]
    pub overlay_color: Option<String>,

    /// JPEG quality (1-100)
    #[serde(default)]
    pub quality: Option<u8>,

    /// Location identity for the render cache
    #[serde(default)]
    pub id: Option<String>,
}

fn default_scale() -> f64 {
    1.0
}

fn default_brightness() -> f32 {
    1.0
}

fn default_overlay_opacity() -> f32 {
    DEFAULT_OVERLAY_OPACITY
}

impl RenderQueryParams {
    /// Build the render request, rejecting oversized or inconsistent input.
    pub fn to_request(&self) -> Result<RenderRequest, RenderError> {
        if self.width > MAX_RENDER_DIMENSION || self.height > MAX_RENDER_DIMENSION {
            return Err(RenderError::InvalidRequest(format!(
                "output {}x{} exceeds the {} pixel limit",
                self.width, self.height, MAX_RENDER_DIMENSION
            )));
        }

        let mut viewport = ViewportRequest::new(
            GeoLocation::new(self.lat, self.lon),
            Dimensions::new(self.width, self.height),
            effective_zoom(self.zoom, self.zoom_offset),
        )
        .with_pan(self.pan_x, self.pan_y)
        .with_scale(self.scale);

        match (self.ref_width, self.ref_height) {
            (Some(width), Some(height)) => {
                if width > MAX_RENDER_DIMENSION || height > MAX_RENDER_DIMENSION {
                    return Err(RenderError::InvalidRequest(format!(
                        "reference {}x{} exceeds the {} pixel limit",
                        width, height, MAX_RENDER_DIMENSION
                    )));
                }
                viewport = viewport.with_reference(Dimensions::new(width, height));
            }
            (None, None) => {}
            _ => {
                return Err(RenderError::InvalidRequest(
                    "ref_width and ref_height must be given together".to_string(),
                ))
            }
        }

        let mut settings = EffectSettings::none()
            .with_brightness(self.brightness)
            .with_blur(self.blur);
        let color = match &self.overlay_color {
            Some(value) => parse_hex_color(value).map_err(RenderError::InvalidRequest)?,
            None => settings.overlay_color(),
        };
        settings = settings.with_overlay(color, self.overlay_opacity);

        let mut request = RenderRequest::new(viewport, settings);
        if let Some(id) = &self.id {
            request = request.with_location_id(id.as_str());
        }
        Ok(request)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Body of every non-2xx answer.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `invalid_request`
    pub error: &'static str,
    pub message: String,
    pub status: u16,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,

    /// Composites currently held in memory
    pub cached_renders: usize,

    /// Whether renders also persist to a durable store
    pub durable_cache: bool,
}

// =============================================================================
// Error Mapping
// =============================================================================

fn classify(err: &RenderError) -> (StatusCode, &'static str) {
    match err {
        RenderError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        RenderError::NoTiles { .. } => (StatusCode::BAD_GATEWAY, "no_tiles"),
        RenderError::Cancelled | RenderError::Superseded { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "cancelled")
        }
        RenderError::Allocation { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "allocation_error"),
        RenderError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
    }
}

/// Render failures become a JSON [`ErrorResponse`].
///
/// Provider outages and internal failures log at ERROR, rejected requests
/// at WARN.
impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        let (status, code) = classify(&self);
        let message = self.to_string();

        if status.is_server_error() {
            error!(code, status = status.as_u16(), %message, "Render request failed");
        } else {
            warn!(code, status = status.as_u16(), %message, "Render request rejected");
        }

        let body = ErrorResponse {
            error: code,
            message,
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

/// Handler-side error so `?` works on [`RenderError`] inside handlers.
pub struct HandlerError(pub RenderError);

impl From<RenderError> for HandlerError {
    fn from(err: RenderError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle render requests.
///
/// # Endpoint
///
/// `GET /render?lat=..&lon=..&zoom=..&width=..&height=..`
///
/// Optional: `zoom_offset`, `pan_x`, `pan_y`, `scale`, `ref_width`,
/// `ref_height`, `brightness`, `blur`, `overlay_opacity`, `overlay_color`,
/// `quality`, `id`.
///
/// # Response
///
/// - `200 OK`: JPEG image
/// - `400 Bad Request`: Invalid parameters
/// - `502 Bad Gateway`: No tile could be fetched from the provider
///
/// # Headers
///
/// - `Content-Type: image/jpeg`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Render-Cache-Hit: true|false`
/// - `X-Render-Zoom`, `X-Render-Tiles`, `X-Render-Failed-Tiles`
pub async fn render_handler<S: TileSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<RenderQueryParams>,
) -> Result<Response, HandlerError> {
    let quality = query.quality.unwrap_or(state.jpeg_quality);
    if !is_valid_quality(quality) {
        return Err(RenderError::InvalidRequest(format!(
            "Invalid quality: {} (must be 1-100)",
            quality
        ))
        .into());
    }

    let request = query.to_request()?;
    let format = ExportFormat::Jpeg { quality };
    let (result, bytes) = state.service.render_export(&request, format).await?;

    debug!(
        cache_hit = result.cache_hit,
        bytes = bytes.len(),
        "Serving render"
    );

    let headers = [
        ("content-type", format.content_type().to_string()),
        (
            "cache-control",
            format!("public, max-age={}", state.cache_max_age),
        ),
        ("x-render-cache-hit", result.cache_hit.to_string()),
        ("x-render-zoom", result.zoom.to_string()),
        ("x-render-tiles", result.tile_count.to_string()),
        ("x-render-failed-tiles", result.failed_tiles.to_string()),
    ];

    Ok((StatusCode::OK, headers, bytes).into_response())
}

/// Handle cache clear requests.
///
/// # Endpoint
///
/// `DELETE /cache`
///
/// Drops every cached render in memory and on disk. Returns `204 No Content`.
pub async fn clear_cache_handler<S: TileSource>(State(state): State<AppState<S>>) -> StatusCode {
    state.service.clear_cache().await;
    debug!("Render cache cleared");
    StatusCode::NO_CONTENT
}

/// `GET /health`: liveness, crate version and render cache occupancy.
pub async fn health_handler<S: TileSource>(
    State(state): State<AppState<S>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        cached_renders: state.service.cache().len().await,
        durable_cache: state.service.cache().has_durable(),
    })
}

// =============================================================================
// Tests
// =============================================================================
