//! Pixel-format and image-kind tags carried in image metadata.

use serde::{Deserialize, Serialize};

/// Pixel layout of the source data an image was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// Single-channel input; only the grayscale plane is populated.
    Grayscale,
    /// Three-channel color input; the RGB plane is retained.
    Rgb,
    /// Four-channel input; alpha is dropped on load, RGB retained.
    Rgba,
}

impl ImageFormat {
    /// True when the format carries no color plane.
    pub fn is_matrix(self) -> bool {
        matches!(self, ImageFormat::Grayscale)
    }
}

/// Provenance of an image within a set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    /// Loaded directly from a source file.
    Base,
    /// Cropped from a parent image.
    Crop,
    /// A single grid section cut from a parent image.
    GridSection,
}

impl Default for ImageKind {
    fn default() -> Self {
        ImageKind::Base
    }
}
