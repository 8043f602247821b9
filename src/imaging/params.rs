//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which plans each variant) and the [`backend`](super::backend) (which does
//! the actual pixel work). This separation allows swapping backends (e.g. for
//! testing with a mock) without changing planning logic.
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`Sharpening`] — Unsharp-mask parameters (sigma + threshold).
//! - [`ColorAdjust`] — The fixed "look" applied to every variant.
//! - [`EncodeParams`] — AVIF encoder settings for one output.
//! - [`TransformParams`] — Full specification for one variant: source, output
//!   path, optional resize target, look, encoder settings.

use std::path::PathBuf;

/// AVIF encoder effort. Fixed for every encode; speed 6 is the
/// size/time balance point for batch work.
pub const ENCODE_SPEED: u8 = 6;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Sharpening parameters for unsharp mask.
///
/// - `sigma`: Standard deviation of the Gaussian blur (higher = more sharpening)
/// - `threshold`: Minimum brightness difference to sharpen (0 = sharpen all pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sharpening {
    pub sigma: f32,
    pub threshold: i32,
}

impl Sharpening {
    /// Light sharpening that restores edge crispness after downscaling
    /// without haloing.
    pub fn light() -> Self {
        Self {
            sigma: 0.5,
            threshold: 0,
        }
    }
}

/// Fixed tonal adjustments applied to every variant, independent of profile.
///
/// Mild saturation/brightness lift plus a slight gamma and contrast bump;
/// compensates for the flattening that aggressive lossy encoding causes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAdjust {
    /// Saturation multiplier (1.0 = unchanged).
    pub saturation: f32,
    /// Brightness multiplier (1.0 = unchanged).
    pub brightness: f32,
    /// Gamma correction exponent base (1.0 = unchanged).
    pub gamma: f32,
    /// Additive contrast in percent as `image::DynamicImage::adjust_contrast`
    /// takes it (0.0 = unchanged).
    pub contrast: f32,
}

impl ColorAdjust {
    pub fn standard() -> Self {
        Self {
            saturation: 1.12,
            brightness: 1.03,
            gamma: 1.05,
            contrast: 2.0,
        }
    }
}

/// AVIF encoder settings for one output file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    pub quality: Quality,
    /// Encode at quality 100 regardless of the profile quality. Set when the
    /// source was itself lossless, so the pipeline never becomes the first
    /// lossy step with a mid-range quality.
    pub near_lossless: bool,
    /// Keep the alpha channel. Opaque sources are flattened to RGB.
    pub keep_alpha: bool,
    pub speed: u8,
}

impl EncodeParams {
    /// Quality actually handed to the encoder.
    pub fn effective_quality(&self) -> Quality {
        if self.near_lossless {
            Quality::new(100)
        } else {
            self.quality
        }
    }
}

/// Full specification for producing one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Resize target, `None` when the source already fits the profile width.
    pub resize: Option<(u32, u32)>,
    pub sharpening: Sharpening,
    pub adjust: ColorAdjust,
    pub encode: EncodeParams,
}
