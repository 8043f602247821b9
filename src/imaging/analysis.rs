//! Source-image metadata captured during analysis.
//!
//! These types serialize verbatim into the mapping store, so field names and
//! formatting (the `"2.00"` aspect label, `#rrggbb` colors) are part of the
//! on-disk contract.

use serde::{Deserialize, Serialize};

use super::calculations::aspect_ratio_label;

/// Pixel dimensions plus the pre-formatted aspect label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    /// `width / height` with two decimals, e.g. `"2.00"`.
    pub aspect_ratio: String,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aspect_ratio: aspect_ratio_label(width, height),
        }
    }
}

/// Color facts sampled from the decoded pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStats {
    /// Any pixel with alpha below 255.
    pub is_transparent: bool,
    /// `#rrggbb` of the most populated coarse color bucket.
    pub dominant_color: String,
    /// Shannon entropy of the luma histogram, in bits (0 to 8).
    pub entropy: f64,
}

/// Everything the analyzer learns about one source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalMetadata {
    /// Container format: `"jpeg"`, `"png"`, `"webp"`, `"tiff"`.
    pub format: String,
    pub dimensions: Dimensions,
    pub byte_size: u64,
    pub color: ColorStats,
    /// Estimated encoder quality of the source, 1-100. Lossless formats
    /// report 100, which switches variants to a near-lossless encode.
    pub source_quality: u8,
    /// `"4:2:0"`, `"4:2:2"`, `"4:4:4"`, or `"none"` for lossless sources.
    pub chroma_subsampling: String,
    /// `"srgb"` or `"gray"`.
    pub color_space: String,
}
