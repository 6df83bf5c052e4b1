//! Render fingerprints.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::render::EffectSettings;

/// Stable identity of a render's pixels.
///
/// A SHA-256 over the location identity, the effective zoom and every
/// effect setting. Pan and scale are deliberately not part of it: cached
/// renders are always untransformed. The hex form is safe to use as a file
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(location_id: &str, zoom: u8, settings: &EffectSettings) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"wallstitch/v1\0");
        hasher.update((location_id.len() as u64).to_le_bytes());
        hasher.update(location_id.as_bytes());
        hasher.update([zoom]);
        hasher.update(settings.blur_radius.to_bits().to_le_bytes());
        hasher.update(settings.brightness.to_bits().to_le_bytes());
        hasher.update(settings.overlay_opacity.to_bits().to_le_bytes());
        hasher.update(settings.overlay_color);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
