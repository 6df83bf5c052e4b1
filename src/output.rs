//! Output resolution presets.
//!
//! A wallpaper is previewed at screen size and may be exported larger. The
//! helpers here pick the export size and the extra tile detail that goes
//! with it, without changing the geographic area.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::viewport::Dimensions;

/// Smallest height produced by a preset other than [`Resolution::Screen`].
pub const MIN_EXPORT_HEIGHT: u32 = 1080;

/// Export resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The device screen size
    #[default]
    Screen,

    /// 1440 wide in portrait, 2560 in landscape
    #[value(name = "2k")]
    #[serde(rename = "2k")]
    Res2K,

    /// 2160 wide in portrait, 3840 in landscape
    #[value(name = "4k")]
    #[serde(rename = "4k")]
    Res4K,
}

impl Resolution {
    /// Preset width as `(portrait, landscape)`; `None` for `Screen`.
    pub fn widths(&self) -> Option<(u32, u32)> {
        match self {
            Resolution::Screen => None,
            Resolution::Res2K => Some((1440, 2560)),
            Resolution::Res4K => Some((2160, 3840)),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Screen => write!(f, "screen"),
            Resolution::Res2K => write!(f, "2k"),
            Resolution::Res4K => write!(f, "4k"),
        }
    }
}

/// Export size for `resolution` on a device with the given `screen`.
///
/// Keeps the screen's aspect ratio; the height never drops below
/// [`MIN_EXPORT_HEIGHT`].
pub fn target_dimensions(resolution: Resolution, screen: Dimensions) -> Dimensions {
    let Some((portrait, landscape)) = resolution.widths() else {
        return screen;
    };
    if screen.is_empty() {
        return screen;
    }

    let width = if screen.is_portrait() {
        portrait
    } else {
        landscape
    };
    let aspect = screen.aspect_ratio();
    let height = ((width as f64 / aspect).round() as u32).max(MIN_EXPORT_HEIGHT);
    Dimensions::new(width, height)
}

/// Zoom levels to add when exporting at `target` instead of `original`.
///
/// Each doubling of width earns one level: 1080 → 2160 is `+1`.
pub fn zoom_correction(original: Dimensions, target: Dimensions) -> i32 {
    if original.width == 0 || target.width == 0 {
        return 0;
    }
    (target.width as f64 / original.width as f64).log2().round() as i32
}

/// A location's base zoom adjusted by the user's zoom offset.
///
/// Not clamped here; the resolver clamps to the provider range.
pub fn effective_zoom(base_zoom: i32, zoom_offset: i32) -> i32 {
    base_zoom.saturating_add(zoom_offset)
}
