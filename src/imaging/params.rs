//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. They are the
//! vocabulary shared between the [`spec`](crate::spec) validator (which
//! produces them from raw request input) and the [`ops`](super::ops) module
//! (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 95). Clamped on construction.
//! - [`OutputFormat`] — The four supported target encodings with their mime types.
//! - [`Direction`] — Mirror axis for rotate/flip. Defaults to vertical.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Supported target encodings for the `format` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl OutputFormat {
    /// Parse a format name, case-insensitively. Returns `None` for anything
    /// outside the four supported encodings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Infer the format from a mime type (e.g. the source record's).
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Filename extension for the encoding.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

/// Mirror axis for the rotate/flip operations.
///
/// Both operation names produce a mirror, never an angular rotation — that
/// is the documented contract. A missing or unrecognized direction means
/// vertical (top-bottom mirror).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Horizontal,
    #[default]
    Vertical,
}

impl Direction {
    /// Parse a direction string. Anything other than `"horizontal"` maps to
    /// [`Direction::Vertical`], matching the default-to-vertical contract.
    pub fn from_name(name: &str) -> Self {
        if name == "horizontal" {
            Self::Horizontal
        } else {
            Self::Vertical
        }
    }
}
