//! Render cache.
//!
//! Memoizes finished composites so the same view is never fetched and
//! composited twice.
//!
//! ```text
//!   get(fingerprint)
//!        │
//!        ▼
//!   ┌──────────┐  miss  ┌───────────────┐  decode error
//!   │ LRU (10) │───────►│ DurableStore  │──────────────► delete, miss
//!   └──────────┘        │ (20, optional)│
//!        ▲              └───────────────┘
//!        └──── promote ────────┘
//! ```
//!
//! Only untransformed renders are cached (no pan, unit scale, reference
//! size equal to output size). The fingerprint therefore leaves pan and
//! scale out.

mod fingerprint;
mod render_cache;
mod store;

pub use fingerprint::Fingerprint;
pub use render_cache::{
    decode_envelope, encode_envelope, RenderCache, DEFAULT_DURABLE_CACHE_ENTRIES,
    DEFAULT_RENDER_CACHE_ENTRIES,
};
pub use store::{DiskStore, DurableStore, MemoryStore};
