//! Image analysis and variant generation, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Analyze** | `image` decoders + custom histograms + [`probe`](self) |
//! | **Transform** | Lanczos3 resize + `unsharpen` + fixed look |
//! | **Encode** | `image::codecs::avif::AvifEncoder` (rav1e) |
//! | **Measure** | `avif-parse` container metadata |
//!
//! The module is split into:
//! - **Calculations**: pure functions for sizing and savings math (unit testable)
//! - **Analysis**: the metadata types the mapping store serializes
//! - **Parameters**: data structures describing transforms
//! - **Probe**: container-level source facts (quality estimate, subsampling)
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: high-level functions combining calculations + backend

pub mod analysis;
pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub(crate) mod probe;
pub mod rust_backend;

pub use analysis::{ColorStats, Dimensions, OriginalMetadata};
pub use backend::{BackendError, ImageBackend, OutputMeasure};
pub use calculations::{
    aspect_ratio_label, bytes_saved, compression_ratio_percent, scaled_dimensions,
};
pub use operations::{OUTPUT_FORMAT, OptimizedVariant, optimize, plan_transform, variant_path};
pub use params::{
    ColorAdjust, ENCODE_SPEED, EncodeParams, Quality, Sharpening, TransformParams,
};
pub use rust_backend::{RustBackend, supported_input_extensions};
// Re-exported for tests (pipeline.rs tests drive the mock)
#[cfg(test)]
pub use backend::tests::{MockBackend, RecordedOp};
