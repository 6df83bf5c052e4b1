use thiserror::Error;

/// Errors that can occur while fetching a single tile from the provider.
///
/// A tile failure never aborts a render on its own; the compositor fills the
/// tile's rectangle with the background color and counts the failure.
#[derive(Debug, Clone, Error)]
pub enum TileFetchError {
    /// The provider did not answer within the configured timeouts
    #[error("Tile request timed out: {url}")]
    Timeout { url: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Provider answered with a non-2xx status
    #[error("Tile provider returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Response body could not be decoded as an image
    #[error("Failed to decode tile: {0}")]
    Decode(String),

    /// URL template produced an unusable URL
    #[error("Invalid tile URL: {0}")]
    InvalidUrl(String),

    /// The render that requested this tile was cancelled
    #[error("Tile fetch cancelled")]
    Cancelled,
}

impl TileFetchError {
    /// Whether the failure is worth retrying on a later render.
    pub fn is_transient(&self) -> bool {
        match self {
            TileFetchError::Timeout { .. }
            | TileFetchError::Connection(_)
            | TileFetchError::Cancelled => true,
            TileFetchError::Status { status, .. } => *status >= 500 || *status == 429,
            TileFetchError::Decode(_) | TileFetchError::InvalidUrl(_) => false,
        }
    }
}

/// Errors that abort a render call.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Rejected before any network activity
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The output canvas could not be allocated
    #[error("Cannot allocate a {width}x{height} canvas")]
    Allocation { width: u32, height: u32 },

    /// Every tile of the viewport failed to load
    #[error("None of the {attempted} tiles could be fetched")]
    NoTiles { attempted: usize },

    /// The caller cancelled the render
    #[error("Render cancelled")]
    Cancelled,

    /// A newer render started before this one finished
    #[error("Render superseded by generation {generation}")]
    Superseded { generation: u64 },

    /// Export encoding failed
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Errors from the durable render cache store.
///
/// These are logged and recovered by the render cache; they never reach
/// render callers.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored entry failed its integrity check
    #[error("Corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Entry could not be serialized
    #[error("Failed to encode cache entry: {0}")]
    Encode(String),
}
