//! High-level variant operations.
//!
//! These functions combine calculations with backend execution: plan the
//! transform one profile needs, run it, measure the written output.

use super::analysis::OriginalMetadata;
use super::backend::{BackendError, ImageBackend, OutputMeasure};
use super::calculations::scaled_dimensions;
use super::params::{
    ColorAdjust, ENCODE_SPEED, EncodeParams, Quality, Sharpening, TransformParams,
};
use crate::config::Profile;
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// The single derived format every variant is encoded to.
pub const OUTPUT_FORMAT: &str = "avif";

/// Output path for a profile's variant: a sibling of the source named
/// `<stem><suffix>.avif`. The file only lives until its upload concludes.
pub fn variant_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    source.with_file_name(format!("{stem}{suffix}.{OUTPUT_FORMAT}"))
}

/// Plan one profile's transform from the analyzer's findings.
///
/// Pure: resize capping (never upscale), near-lossless promotion for
/// lossless sources, and alpha retention all fall out of the analysis here,
/// so they are testable without a backend.
pub fn plan_transform(
    source: &Path,
    output: &Path,
    profile: &Profile,
    analysis: &OriginalMetadata,
) -> TransformParams {
    TransformParams {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        resize: scaled_dimensions(
            (analysis.dimensions.width, analysis.dimensions.height),
            profile.max_width,
        ),
        sharpening: Sharpening::light(),
        adjust: ColorAdjust::standard(),
        encode: EncodeParams {
            quality: Quality::new(profile.quality),
            near_lossless: analysis.source_quality >= 100,
            keep_alpha: analysis.color.is_transparent,
            speed: ENCODE_SPEED,
        },
    }
}

/// One generated variant with its measured facts.
#[derive(Debug, Clone)]
pub struct OptimizedVariant {
    pub output_path: PathBuf,
    pub measure: OutputMeasure,
}

/// Generate one profile's variant: plan, transform, measure the output.
///
/// The measured values, not the planned ones, travel onward; the encoder has
/// the final say on what was written.
pub fn optimize(
    backend: &impl ImageBackend,
    source: &Path,
    profile: &Profile,
    analysis: &OriginalMetadata,
) -> Result<OptimizedVariant> {
    let output = variant_path(source, &profile.suffix);
    let params = plan_transform(source, &output, profile, analysis);
    backend.transform(&params)?;
    let measure = backend.measure(&output)?;
    Ok(OptimizedVariant {
        output_path: output,
        measure,
    })
}
