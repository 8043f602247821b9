//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: analyze, transform, and measure.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and
//! statically linked. Tests swap in the recording `MockBackend` so pipeline
//! logic runs without codecs.

use super::analysis::OriginalMetadata;
use super::params::TransformParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Post-encode facts measured from a written variant file.
///
/// These, not the planned values, are what ends up in variant records: the
/// encoder has the final say on dimensions and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputMeasure {
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub has_alpha: bool,
}

/// Trait for image processing backends.
///
/// Every backend must implement all three operations so the rest of the
/// codebase is backend-agnostic.
pub trait ImageBackend: Sync {
    /// Decode a source image and extract its full metadata.
    fn analyze(&self, path: &Path) -> Result<OriginalMetadata, BackendError>;

    /// Execute one variant transform: resize, look adjustments, encode.
    fn transform(&self, params: &TransformParams) -> Result<(), BackendError>;

    /// Measure a written variant file (container-level, no decode).
    fn measure(&self, path: &Path) -> Result<OutputMeasure, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::analysis::{ColorStats, Dimensions};
    use std::sync::Mutex;

    /// Mock backend that records operations instead of touching pixels.
    ///
    /// `transform` still writes a small marker file at the output path so
    /// cleanup behavior is observable in pipeline tests. Uses Mutex so the
    /// mock satisfies the trait's `Sync` bound.
    #[derive(Default)]
    pub struct MockBackend {
        /// Scripted analyze results, popped from the end; empty means
        /// [`MockBackend::default_metadata`].
        pub analyze_results: Mutex<Vec<OriginalMetadata>>,
        /// Scripted measure results, popped from the end; empty means
        /// [`MockBackend::default_measure`].
        pub measure_results: Mutex<Vec<OutputMeasure>>,
        pub operations: Mutex<Vec<RecordedOp>>,
        /// Paths containing this substring fail their analyze call.
        pub fail_analyze_containing: Option<String>,
        /// Output paths containing this substring fail their transform call.
        pub fail_transform_containing: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Analyze(String),
        Transform {
            source: String,
            output: String,
            resize: Option<(u32, u32)>,
            quality: u32,
            keep_alpha: bool,
        },
        Measure(String),
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_metadata(results: Vec<OriginalMetadata>) -> Self {
            Self {
                analyze_results: Mutex::new(results),
                ..Self::default()
            }
        }

        pub fn failing_analyze(substring: &str) -> Self {
            Self {
                fail_analyze_containing: Some(substring.to_string()),
                ..Self::default()
            }
        }

        pub fn failing_transform(substring: &str) -> Self {
            Self {
                fail_transform_containing: Some(substring.to_string()),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        /// A plausible 2:1 JPEG source, 1 MB on disk.
        pub fn default_metadata() -> OriginalMetadata {
            OriginalMetadata {
                format: "jpeg".to_string(),
                dimensions: Dimensions::new(2000, 1000),
                byte_size: 1_000_000,
                color: ColorStats {
                    is_transparent: false,
                    dominant_color: "#808080".to_string(),
                    entropy: 5.0,
                },
                source_quality: 85,
                chroma_subsampling: "4:2:0".to_string(),
                color_space: "srgb".to_string(),
            }
        }

        pub fn default_measure() -> OutputMeasure {
            OutputMeasure {
                width: 640,
                height: 320,
                byte_size: 100_000,
                has_alpha: false,
            }
        }
    }

    impl ImageBackend for MockBackend {
        fn analyze(&self, path: &Path) -> Result<OriginalMetadata, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Analyze(path.to_string_lossy().to_string()));

            if let Some(marker) = &self.fail_analyze_containing
                && path.to_string_lossy().contains(marker.as_str())
            {
                return Err(BackendError::Decode("scripted analyze failure".to_string()));
            }

            Ok(self
                .analyze_results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(Self::default_metadata))
        }

        fn transform(&self, params: &TransformParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Transform {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                resize: params.resize,
                quality: params.encode.effective_quality().value(),
                keep_alpha: params.encode.keep_alpha,
            });

            if let Some(marker) = &self.fail_transform_containing
                && params.output.to_string_lossy().contains(marker.as_str())
            {
                return Err(BackendError::Encode(
                    "scripted transform failure".to_string(),
                ));
            }

            std::fs::write(&params.output, b"mock avif bytes")?;
            Ok(())
        }

        fn measure(&self, path: &Path) -> Result<OutputMeasure, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Measure(path.to_string_lossy().to_string()));

            Ok(self
                .measure_results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(Self::default_measure))
        }
    }

    #[test]
    fn mock_records_analyze() {
        let backend = MockBackend::new();

        let meta = backend.analyze(Path::new("/test/image.jpg")).unwrap();
        assert_eq!(meta.dimensions.width, 2000);
        assert_eq!(meta.dimensions.aspect_ratio, "2.00");

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Analyze(p) if p == "/test/image.jpg"));
    }

    #[test]
    fn mock_scripted_analyze_pops_from_end() {
        let mut second = MockBackend::default_metadata();
        second.byte_size = 42;
        let backend = MockBackend::with_metadata(vec![second, MockBackend::default_metadata()]);

        assert_eq!(
            backend.analyze(Path::new("/a.jpg")).unwrap().byte_size,
            1_000_000
        );
        assert_eq!(backend.analyze(Path::new("/b.jpg")).unwrap().byte_size, 42);
    }

    #[test]
    fn mock_transform_records_and_writes_marker_file() {
        use crate::imaging::params::{ColorAdjust, EncodeParams, Quality, Sharpening};

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("photo-small.avif");
        let backend = MockBackend::new();

        backend
            .transform(&TransformParams {
                source: "/source.jpg".into(),
                output: output.clone(),
                resize: Some((640, 320)),
                sharpening: Sharpening::light(),
                adjust: ColorAdjust::standard(),
                encode: EncodeParams {
                    quality: Quality::new(70),
                    near_lossless: false,
                    keep_alpha: false,
                    speed: crate::imaging::params::ENCODE_SPEED,
                },
            })
            .unwrap();

        assert!(output.exists());
        let ops = backend.get_operations();
        assert!(matches!(
            &ops[0],
            RecordedOp::Transform {
                resize: Some((640, 320)),
                quality: 70,
                ..
            }
        ));
    }

    #[test]
    fn mock_scripted_analyze_failure() {
        let backend = MockBackend::failing_analyze("broken");

        assert!(backend.analyze(Path::new("/ok.jpg")).is_ok());
        let err = backend.analyze(Path::new("/broken.jpg")).unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }
}
