//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Pixel statistics | custom histograms over the RGBA8 view |
//! | Source probing | custom [`probe`](super::probe) (DQT quality, SOF subsampling, RIFF sniff) |
//! | Resize | `image::imageops` with `Lanczos3` filter |
//! | Sharpening | `image::imageops::unsharpen` |
//! | Look (saturation, brightness, gamma, contrast) | per-pixel math + `adjust_contrast` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//! | Measure output | `avif-parse` (container metadata, no decode) |

use super::analysis::{ColorStats, Dimensions, OriginalMetadata};
use super::backend::{BackendError, ImageBackend, OutputMeasure};
use super::params::{ColorAdjust, TransformParams};
use super::probe;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in and known to work.
///
/// AVIF is deliberately absent: the `image` crate's `"avif"` feature only
/// enables the **encoder** (rav1e), and AVIF is this pipeline's output
/// format, never a source.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk, sniffing the format from content.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| BackendError::Decode(format!("failed to decode {}: {e}", path.display())))
}

fn format_label(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Tiff => "tiff",
        other => other.extensions_str().first().copied().unwrap_or("unknown"),
    }
}

/// Histogram-based color statistics over the RGBA8 view.
///
/// Entropy is Shannon entropy of the 256-bin Rec. 601 luma histogram, in
/// bits. The dominant color is the center of the most populated 4-bits-per-
/// channel RGB bucket; coarse buckets keep sensor noise from splitting one
/// perceptual color across thousands of exact values.
fn pixel_stats(rgba: &RgbaImage) -> ColorStats {
    let mut luma_hist = [0u64; 256];
    let mut bucket_hist = vec![0u64; 4096];
    let mut transparent = false;

    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a < 255 {
            transparent = true;
        }
        let luma = (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as usize;
        luma_hist[luma.min(255)] += 1;
        let bucket = ((r as usize >> 4) << 8) | ((g as usize >> 4) << 4) | (b as usize >> 4);
        bucket_hist[bucket] += 1;
    }

    let total = u64::from(rgba.width()) * u64::from(rgba.height());
    let mut entropy = 0.0;
    if total > 0 {
        for &count in &luma_hist {
            if count > 0 {
                let p = count as f64 / total as f64;
                entropy -= p * p.log2();
            }
        }
    }

    let dominant = bucket_hist
        .iter()
        .enumerate()
        .max_by_key(|&(_, &count)| count)
        .map(|(bucket, _)| bucket)
        .unwrap_or(0);
    let center = |nibble: usize| ((nibble as u8) << 4) | 0x08;
    let dominant_color = format!(
        "#{:02x}{:02x}{:02x}",
        center((dominant >> 8) & 0xF),
        center((dominant >> 4) & 0xF),
        center(dominant & 0xF)
    );

    ColorStats {
        is_transparent: transparent,
        dominant_color,
        entropy: ((entropy * 100.0).round() / 100.0).max(0.0),
    }
}

/// Saturation, brightness, and gamma in one pass over the pixels.
///
/// Saturation scales each channel's distance from the pixel's luma;
/// brightness is a straight multiplier; gamma goes through a lookup table.
/// Alpha is left untouched.
fn apply_look(rgba: &mut RgbaImage, adjust: &ColorAdjust) {
    let inv_gamma = 1.0 / f64::from(adjust.gamma);
    let gamma_lut: [u8; 256] = std::array::from_fn(|v| {
        let normalized = v as f64 / 255.0;
        (normalized.powf(inv_gamma) * 255.0).round().clamp(0.0, 255.0) as u8
    });

    for pixel in rgba.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        let map = |v: u8| {
            let saturated = luma + (f64::from(v) - luma) * f64::from(adjust.saturation);
            let brightened = saturated * f64::from(adjust.brightness);
            gamma_lut[brightened.round().clamp(0.0, 255.0) as usize]
        };
        pixel.0 = [map(r), map(g), map(b), a];
    }
}

/// Encode and save as AVIF using ravif/rav1e.
fn save_avif(img: &DynamicImage, path: &Path, quality: u32, speed: u8) -> Result<(), BackendError> {
    let file = std::fs::File::create(path).map_err(BackendError::Io)?;
    let writer = std::io::BufWriter::new(file);
    let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
        writer,
        speed,
        quality.clamp(1, 100) as u8,
    );
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("AVIF encode failed: {e}")))
}

impl ImageBackend for RustBackend {
    fn analyze(&self, path: &Path) -> Result<OriginalMetadata, BackendError> {
        let byte_size = std::fs::metadata(path).map_err(BackendError::Io)?.len();

        let reader = ImageReader::open(path)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?;
        let format = reader.format().ok_or_else(|| {
            BackendError::Decode(format!("unrecognized image format: {}", path.display()))
        })?;
        let img = reader
            .decode()
            .map_err(|e| BackendError::Decode(format!("failed to decode {}: {e}", path.display())))?;

        let color_space = if img.color().has_color() {
            "srgb"
        } else {
            "gray"
        };
        let dimensions = Dimensions::new(img.width(), img.height());
        let color = pixel_stats(&img.to_rgba8());
        let probed = probe::probe_file(path);

        Ok(OriginalMetadata {
            format: format_label(format).to_string(),
            dimensions,
            byte_size,
            color,
            source_quality: probed.source_quality,
            chroma_subsampling: probed.chroma_subsampling,
            color_space: color_space.to_string(),
        })
    }

    fn transform(&self, params: &TransformParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;

        // Resize target comes pre-computed from the plan; exact avoids the
        // fit rounding disagreeing with the planned pair by a pixel.
        let img = match params.resize {
            Some((width, height)) => img.resize_exact(width, height, FilterType::Lanczos3),
            None => img,
        };

        let mut rgba =
            image::imageops::unsharpen(&img, params.sharpening.sigma, params.sharpening.threshold);
        apply_look(&mut rgba, &params.adjust);
        let adjusted = DynamicImage::ImageRgba8(rgba).adjust_contrast(params.adjust.contrast);

        // Normalize: gray sources become RGB, opaque sources are flattened.
        let normalized = if params.encode.keep_alpha {
            adjusted
        } else {
            DynamicImage::ImageRgb8(adjusted.to_rgb8())
        };

        save_avif(
            &normalized,
            &params.output,
            params.encode.effective_quality().value(),
            params.encode.speed,
        )
    }

    fn measure(&self, path: &Path) -> Result<OutputMeasure, BackendError> {
        let file_data = std::fs::read(path).map_err(BackendError::Io)?;
        let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&file_data)).map_err(|e| {
            BackendError::Decode(format!("failed to parse AVIF {}: {e:?}", path.display()))
        })?;
        let meta = avif.primary_item_metadata().map_err(|e| {
            BackendError::Decode(format!(
                "failed to read AVIF metadata {}: {e:?}",
                path.display()
            ))
        })?;

        Ok(OutputMeasure {
            width: meta.max_frame_width.get(),
            height: meta.max_frame_height.get(),
            byte_size: file_data.len() as u64,
            has_alpha: avif.alpha_item.is_some(),
        })
    }
}
