//! Configuration for wallstitch.
//!
//! Everything comes from command-line arguments via clap, with environment
//! variables under the `WALLSTITCH_` prefix as a fallback and defaults for
//! every optional setting.
//!
//! # Environment Variables
//!
//! Tile engine (both commands):
//!
//! - `WALLSTITCH_TILE_URL` - Provider URL template with `{z}`, `{x}`, `{y}`
//! - `WALLSTITCH_MIN_ZOOM` / `WALLSTITCH_MAX_ZOOM` - Provider zoom range (default: 3..19)
//! - `WALLSTITCH_PARALLELISM` - Simultaneous tile requests (default: 10)
//! - `WALLSTITCH_CONNECT_TIMEOUT` / `WALLSTITCH_READ_TIMEOUT` - Seconds (default: 10 / 15)
//! - `WALLSTITCH_TILE_CACHE` - Decoded tiles kept in memory (default: 200)
//! - `WALLSTITCH_RENDER_CACHE` - Renders kept in memory (default: 10)
//! - `WALLSTITCH_DISK_CACHE_DIR` - Directory for the durable render cache
//! - `WALLSTITCH_DISK_CACHE` - Renders kept on disk (default: 20)
//!
//! Server:
//!
//! - `WALLSTITCH_HOST` - Bind address (default: 0.0.0.0)
//! - `WALLSTITCH_PORT` - Port (default: 3000)
//! - `WALLSTITCH_JPEG_QUALITY` - Preview JPEG quality (default: 90)
//! - `WALLSTITCH_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `WALLSTITCH_CORS_ORIGINS` - Comma-separated allowed origins

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::cache::{DEFAULT_DURABLE_CACHE_ENTRIES, DEFAULT_RENDER_CACHE_ENTRIES};
use crate::fetch::{
    HttpSourceConfig, UrlTemplate, DEFAULT_PARALLELISM, DEFAULT_TILE_CACHE_ENTRIES,
    DEFAULT_TILE_URL_TEMPLATE, DEFAULT_USER_AGENT,
};
use crate::geo::{GeoLocation, MAX_ZOOM, MIN_ZOOM};
use crate::output::{effective_zoom, target_dimensions, zoom_correction, Resolution};
use crate::render::{
    is_valid_quality, parse_hex_color, EffectSettings, ExportFormat, RenderRequest,
    DEFAULT_JPEG_QUALITY, DEFAULT_OVERLAY_OPACITY, PREVIEW_JPEG_QUALITY,
};
use crate::viewport::{Dimensions, ViewportRequest, ZoomRange};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 15;

/// Largest parallelism accepted from configuration.
pub const MAX_PARALLELISM: usize = 64;

// =============================================================================
// CLI Structure
// =============================================================================

/// wallstitch - seamless wallpapers from slippy-map satellite tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "wallstitch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve rendered wallpapers over HTTP
    Serve(ServeConfig),

    /// Render one wallpaper to a file
    Render(RenderConfig),
}

// =============================================================================
// Engine Arguments
// =============================================================================

/// Tile engine settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Provider URL template containing `{z}`, `{x}` and `{y}`.
    #[arg(long, default_value = DEFAULT_TILE_URL_TEMPLATE, env = "WALLSTITCH_TILE_URL")]
    pub tile_url: String,

    /// Lowest zoom the provider serves.
    #[arg(long, default_value_t = MIN_ZOOM, env = "WALLSTITCH_MIN_ZOOM")]
    pub min_zoom: u8,

    /// Highest zoom the provider serves.
    #[arg(long, default_value_t = MAX_ZOOM, env = "WALLSTITCH_MAX_ZOOM")]
    pub max_zoom: u8,

    /// Maximum simultaneous tile requests.
    #[arg(long, default_value_t = DEFAULT_PARALLELISM, env = "WALLSTITCH_PARALLELISM")]
    pub parallelism: usize,

    /// Connect timeout for tile requests, in seconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, env = "WALLSTITCH_CONNECT_TIMEOUT")]
    pub connect_timeout_secs: u64,

    /// Read timeout for tile requests, in seconds.
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_SECS, env = "WALLSTITCH_READ_TIMEOUT")]
    pub read_timeout_secs: u64,

    /// Decoded tiles kept in memory.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_ENTRIES, env = "WALLSTITCH_TILE_CACHE")]
    pub tile_cache_entries: usize,

    /// Finished renders kept in memory.
    #[arg(long, default_value_t = DEFAULT_RENDER_CACHE_ENTRIES, env = "WALLSTITCH_RENDER_CACHE")]
    pub render_cache_entries: usize,

    /// Directory for the durable render cache. Disabled when unset.
    #[arg(long, env = "WALLSTITCH_DISK_CACHE_DIR")]
    pub disk_cache_dir: Option<PathBuf>,

    /// Finished renders kept on disk.
    #[arg(long, default_value_t = DEFAULT_DURABLE_CACHE_ENTRIES, env = "WALLSTITCH_DISK_CACHE")]
    pub disk_cache_entries: usize,

    /// User-Agent sent to the tile provider.
    #[arg(long, default_value = DEFAULT_USER_AGENT, env = "WALLSTITCH_USER_AGENT")]
    pub user_agent: String,
}

impl EngineArgs {
    pub fn validate(&self) -> Result<(), String> {
        UrlTemplate::new(self.tile_url.as_str()).map_err(|e| e.to_string())?;
        self.zoom_range()
            .validate()
            .map_err(|e| e.to_string())?;

        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(format!(
                "parallelism must be between 1 and {}",
                MAX_PARALLELISM
            ));
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err("timeouts must be greater than 0".to_string());
        }
        if self.tile_cache_entries == 0 {
            return Err("tile_cache_entries must be greater than 0".to_string());
        }
        if self.render_cache_entries == 0 {
            return Err("render_cache_entries must be greater than 0".to_string());
        }
        if self.disk_cache_entries == 0 {
            return Err("disk_cache_entries must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn zoom_range(&self) -> ZoomRange {
        ZoomRange::new(self.min_zoom, self.max_zoom)
    }

    pub fn url_template(&self) -> Result<UrlTemplate, String> {
        UrlTemplate::new(self.tile_url.as_str()).map_err(|e| e.to_string())
    }

    pub fn http_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            user_agent: self.user_agent.clone(),
            ..HttpSourceConfig::default()
        }
    }
}

// =============================================================================
// Serve Command
// =============================================================================

/// Configuration for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "WALLSTITCH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "WALLSTITCH_PORT")]
    pub port: u16,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "WALLSTITCH_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin when unset.
    #[arg(long, env = "WALLSTITCH_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Default JPEG quality for previews (1-100).
    #[arg(long, default_value_t = PREVIEW_JPEG_QUALITY, env = "WALLSTITCH_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Render Command
// =============================================================================

/// Configuration for the `render` command.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Center latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Center longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Base zoom level of the location.
    #[arg(long)]
    pub zoom: i32,

    /// Added to the base zoom (negative zooms out).
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub zoom_offset: i32,

    /// Screen width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Screen height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Width of the screen the pan/scale were recorded on.
    #[arg(long, requires = "reference_height")]
    pub reference_width: Option<u32>,

    /// Height of the screen the pan/scale were recorded on.
    #[arg(long, requires = "reference_width")]
    pub reference_height: Option<u32>,

    /// Horizontal pan in reference pixels.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pan_x: f64,

    /// Vertical pan in reference pixels.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pan_y: f64,

    /// Pinch scale (1.0 = none).
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,

    /// Brightness multiplier.
    #[arg(long, default_value_t = 1.0)]
    pub brightness: f32,

    /// Blur radius in output pixels (0 = off).
    #[arg(long, default_value_t = 0.0)]
    pub blur: f32,

    /// Overlay opacity (0-1).
    #[arg(long, default_value_t = DEFAULT_OVERLAY_OPACITY)]
    pub overlay_opacity: f32,

    /// Overlay color as #RRGGBB or #AARRGGBB.
    #[arg(long, default_value = "#000000")]
    pub overlay_color: String,

    /// Export resolution.
    #[arg(long, value_enum, default_value_t = Resolution::Screen)]
    pub resolution: Resolution,

    /// Output format: jpeg or png.
    #[arg(long, default_value = "jpeg")]
    pub format: String,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub quality: u8,

    /// Output file path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if !is_valid_quality(self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }
        self.export_format()?;
        self.settings()?;
        Ok(())
    }

    /// The device screen the render is framed for.
    pub fn screen(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn export_format(&self) -> Result<ExportFormat, String> {
        match self.format.parse::<ExportFormat>()? {
            ExportFormat::Jpeg { .. } => Ok(ExportFormat::Jpeg {
                quality: self.quality,
            }),
            ExportFormat::Png => Ok(ExportFormat::Png),
        }
    }

    pub fn settings(&self) -> Result<EffectSettings, String> {
        let color = parse_hex_color(&self.overlay_color)?;
        let settings = EffectSettings::none()
            .with_brightness(self.brightness)
            .with_blur(self.blur)
            .with_overlay(color, self.overlay_opacity);
        settings.validate().map_err(|e| e.to_string())?;
        Ok(settings)
    }

    /// Build the render request.
    ///
    /// A preset resolution renders at the preset size with the screen as
    /// reference, and fetches deeper tiles when the export is at least twice
    /// as wide.
    pub fn to_request(&self) -> Result<RenderRequest, String> {
        let screen = self.screen();
        let reference = match (self.reference_width, self.reference_height) {
            (Some(width), Some(height)) => Dimensions::new(width, height),
            _ => screen,
        };
        let output = target_dimensions(self.resolution, screen);

        let viewport = ViewportRequest::new(
            GeoLocation::new(self.lat, self.lon),
            output,
            effective_zoom(self.zoom, self.zoom_offset),
        )
        .with_pan(self.pan_x, self.pan_y)
        .with_scale(self.scale)
        .with_reference(reference)
        .with_detail_zoom(zoom_correction(reference, output));

        Ok(RenderRequest::new(viewport, self.settings()?))
    }
}

// =============================================================================
// Tests
// =============================================================================
