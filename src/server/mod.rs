//! HTTP server layer for wallstitch.
//!
//! Serves wallpaper previews for any viewport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      GET /render?lat=..&lon=..&zoom=..&width=..&height=..       │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (query → RenderRequest)  │  │  (CORS, tracing, state)     │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────┬───────────────────────────────┘
//!                                   ▼
//!                          WallpaperService
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    clear_cache_handler, health_handler, render_handler, AppState, ErrorResponse, HandlerError,
    HealthResponse, RenderQueryParams, MAX_RENDER_DIMENSION,
};
pub use routes::{create_router, RouterConfig};
