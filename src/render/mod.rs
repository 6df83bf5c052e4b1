//! Compositing, effects, export and render orchestration.
//!
//! # Pipeline
//!
//! ```text
//! RenderRequest ──► resolve ──► fetch tiles ──► composite ──► effects
//!                                                               │
//!        caller ◄── CompositeResult ◄── render cache ◄──────────┘
//! ```
//!
//! - [`WallpaperService`]: the render entry point
//! - [`RenderSession`]: cancels stale renders when a newer one starts
//! - [`Compositor`]: draws tiles onto a canvas and letterbox-fits results
//! - [`EffectSettings`]: brightness, blur and color overlay
//! - [`ExportEncoder`]: JPEG/PNG bytes for saving or serving

mod compositor;
mod effects;
mod encoder;
mod service;

pub use compositor::{
    allocate_canvas, CompositeResult, Compositor, DEFAULT_BACKGROUND, MAX_CANVAS_PIXELS,
};
pub use effects::{
    apply_blur, apply_brightness, apply_overlay, parse_hex_color, EffectSettings,
    DEFAULT_OVERLAY_COLOR, DEFAULT_OVERLAY_OPACITY,
};
pub use encoder::{
    clamp_quality, is_valid_quality, ExportEncoder, ExportFormat, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY, PREVIEW_JPEG_QUALITY,
};
pub use service::{RenderRequest, RenderSession, WallpaperService};
