//! Tile sources.
//!
//! A [`TileSource`] turns a normalized [`TileIndex`] into the raw bytes of one
//! provider tile. The production implementation is [`HttpTileSource`], which
//! substitutes the index into a provider URL template and downloads it with a
//! pooled reqwest client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::TileFetchError;
use crate::geo::TileIndex;

/// ESRI World Imagery, addressed `{z}/{y}/{x}`.
pub const DEFAULT_TILE_URL_TEMPLATE: &str =
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}";

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// User agent sent to tile providers.
pub const DEFAULT_USER_AGENT: &str = concat!("wallstitch/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// TileSource Trait
// =============================================================================

/// Provider of encoded tile images.
///
/// Implementations must be cheap to call concurrently; the fetcher bounds
/// how many calls are in flight.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetch the encoded image for one tile.
    ///
    /// Non-2xx answers, timeouts, and transport errors are all failures of
    /// this tile only.
    async fn fetch(&self, index: TileIndex) -> Result<Bytes, TileFetchError>;
}

// =============================================================================
// URL Template
// =============================================================================

/// Provider URL with `{z}`, `{x}` and `{y}` placeholders.
///
/// Placeholder order is free, so both `.../{z}/{x}/{y}.png` and ESRI's
/// `.../tile/{z}/{y}/{x}` work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    template: String,
}

impl UrlTemplate {
    /// Parse a template, checking that every placeholder is present and that
    /// the result is an absolute http(s) URL.
    pub fn new(template: impl Into<String>) -> Result<Self, TileFetchError> {
        let template = template.into();

        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(TileFetchError::InvalidUrl(format!(
                    "template '{}' is missing {}",
                    template, placeholder
                )));
            }
        }

        let probe = Self {
            template: template.clone(),
        };
        let url = probe.url_for(TileIndex {
            x: 0,
            y: 0,
            zoom: 0,
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TileFetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        Ok(probe)
    }

    /// The raw template string.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute a tile index into the template.
    pub fn render(&self, index: TileIndex) -> String {
        self.template
            .replace("{z}", &index.zoom.to_string())
            .replace("{x}", &index.x.to_string())
            .replace("{y}", &index.y.to_string())
    }

    /// Substitute and parse.
    pub fn url_for(&self, index: TileIndex) -> Result<Url, TileFetchError> {
        let raw = self.render(index);
        Url::parse(&raw).map_err(|e| TileFetchError::InvalidUrl(format!("{}: {}", raw, e)))
    }
}

impl Default for UrlTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TILE_URL_TEMPLATE.to_string(),
        }
    }
}

// =============================================================================
// HTTP Tile Source
// =============================================================================

/// Client settings for [`HttpTileSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,

    /// Time allowed between reads once connected
    pub read_timeout: Duration,

    /// User-Agent header value
    pub user_agent: String,

    /// Idle connections kept per provider host
    pub max_idle_per_host: usize,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_idle_per_host: 16,
        }
    }
}

/// Slippy-map tile source over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTileSource {
    client: reqwest::Client,
    template: UrlTemplate,
}

impl HttpTileSource {
    /// Create a source with default timeouts (10s connect, 15s read).
    pub fn new(template: UrlTemplate) -> Result<Self, TileFetchError> {
        Self::with_config(template, HttpSourceConfig::default())
    }

    /// Create a source with custom client settings.
    pub fn with_config(
        template: UrlTemplate,
        config: HttpSourceConfig,
    ) -> Result<Self, TileFetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                TileFetchError::Connection(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, template })
    }

    /// The URL template requests are built from.
    pub fn template(&self) -> &UrlTemplate {
        &self.template
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn fetch(&self, index: TileIndex) -> Result<Bytes, TileFetchError> {
        let url = self.template.url_for(index)?;
        trace!(tile = %index, url = %url, "Tile request starting");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_error(e, &url))?;

        let status = response.status();
        if !status.is_success() {
            warn!(tile = %index, status = status.as_u16(), "Tile provider error status");
            return Err(TileFetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(e, &url))?;

        debug!(tile = %index, bytes = body.len(), "Tile downloaded");
        Ok(body)
    }
}

fn classify_error(err: reqwest::Error, url: &Url) -> TileFetchError {
    warn!(
        url = %url,
        error = %err,
        is_connect = err.is_connect(),
        is_timeout = err.is_timeout(),
        "Tile request failed"
    );

    if err.is_timeout() {
        TileFetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        TileFetchError::Connection(err.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
