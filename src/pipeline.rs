//! The end-to-end optimization run.
//!
//! [`run`] wires the production backend and media host together;
//! [`run_with`] is the dependency-injected core the tests drive with mocks.
//! One run:
//!
//! 1. Ensure the state directory exists and load the mapping store.
//! 2. Discover candidate images under the content root.
//! 3. Reconcile the store against the current tree, persist it, and write
//!    the cleanup report.
//! 4. Process every candidate whose basename is not yet in the store.
//!    Analysis, each transform, and each upload run under the retry policy.
//!    An image either lands in the store with all of its variants hosted,
//!    or leaves no trace beyond an error entry in the processing report.
//! 5. Persist the store, write the processing report, and return the run
//!    statistics.
//!
//! A failure inside one image never aborts the run. Store and report IO
//! errors do: state the next run depends on must not be silently stale.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::config::{self, ConfigError, PipelineConfig};
use crate::discover;
use crate::events::{CountingSink, EventSink, PipelineEvent};
use crate::imaging::{
    BackendError, ImageBackend, OUTPUT_FORMAT, RustBackend, compression_ratio_percent, optimize,
    variant_path,
};
use crate::report::{ProcessingReport, RunStatistics};
use crate::retry::RetryPolicy;
use crate::store::{
    ImageRecord, MappingStore, OptimizationInfo, StoreError, VariantDimensions, VariantRecord,
};
use crate::upload::{HttpMediaHost, MediaHost, UploadError};

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mapping store error: {0}")]
    Store(#[from] StoreError),

    #[error("Could not build the upload client: {0}")]
    Client(#[from] UploadError),

    #[error("Could not scan {0}: {1}")]
    Discovery(PathBuf, #[source] io::Error),

    #[error("State write failed: {0}")]
    Io(#[from] io::Error),

    #[error("No API key given. Pass --api-key or set PIXLIFT_API_KEY")]
    MissingApiKey,
}

/// A single image's terminal failure, tagged with the stage that caused it.
///
/// Stage labels feed [`PipelineEvent::ImageFailed`] and the processing
/// report; the profile name is carried in the message for the two
/// per-variant stages.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Analysis failed: {0}")]
    Analysis(#[source] BackendError),

    #[error("Optimization failed [{profile}]: {source}")]
    Optimization {
        profile: String,
        #[source]
        source: BackendError,
    },

    #[error("Upload failed [{profile}]: {source}")]
    Upload {
        profile: String,
        #[source]
        source: UploadError,
    },
}

impl ImageError {
    pub fn stage(&self) -> &'static str {
        match self {
            ImageError::Analysis(_) => "analysis",
            ImageError::Optimization { .. } => "optimization",
            ImageError::Upload { .. } => "upload",
        }
    }
}

/// Run the pipeline with the pure-Rust backend and the configured media host.
pub fn run(
    root: &Path,
    state_dir: &Path,
    config: &PipelineConfig,
    api_key: &str,
    sink: &dyn EventSink,
) -> Result<ProcessingReport, PipelineError> {
    let backend = RustBackend::new();
    let host = HttpMediaHost::from_config(&config.upload)?;
    run_with(&backend, &host, root, state_dir, config, api_key, sink)
}

/// Run the pipeline against any backend and media host.
///
/// All orchestration lives here; [`run`] only picks the production
/// implementations. Returns the same processing report it persists, so the
/// caller can print a summary without re-reading state.
pub fn run_with<B: ImageBackend, H: MediaHost>(
    backend: &B,
    host: &H,
    root: &Path,
    state_dir: &Path,
    config: &PipelineConfig,
    api_key: &str,
    sink: &dyn EventSink,
) -> Result<ProcessingReport, PipelineError> {
    let sink = CountingSink::new(sink);

    std::fs::create_dir_all(state_dir)?;
    let mut store = MappingStore::load(state_dir)?;

    let candidates = discover::discover_images(root, &config.discovery)
        .map_err(|err| PipelineError::Discovery(root.to_path_buf(), err))?;
    sink.emit(PipelineEvent::RunStarted {
        root: root.display().to_string(),
        candidates: candidates.len(),
    });

    // Reconcile first so the skip check below only ever sees live entries.
    let current = discover::basenames(&candidates);
    let cleanup = store.reconcile(&current);
    store.save(state_dir)?;
    cleanup.save(state_dir)?;
    sink.emit(PipelineEvent::StorePruned {
        removed: cleanup.removed as usize,
        retained: cleanup.retained as usize,
        duration_secs: cleanup.duration_seconds,
    });

    let policy = config::retry_policy(&config.retry);
    let total = candidates.len();
    let mut stats = RunStatistics::new();

    for (index, source) in candidates.iter().enumerate() {
        let basename = discover::basename(source);
        if store.contains(&basename) {
            stats.record_skip();
            sink.emit(PipelineEvent::ImageSkipped { basename });
            continue;
        }

        sink.emit(PipelineEvent::ImageStarted {
            basename: basename.clone(),
            index: index + 1,
            total,
        });

        match process_image(backend, host, source, config, &policy, api_key, &sink) {
            Ok(record) => {
                let bytes_before = record.metadata.byte_size;
                let bytes_after = record.versions.values().map(|v| v.byte_size).sum();
                sink.emit(PipelineEvent::ImageCompleted {
                    basename: basename.clone(),
                    variants: record.versions.len(),
                    bytes_before,
                    bytes_after,
                });
                stats.record_success(bytes_before, bytes_after);
                store.insert(basename, record);
            }
            Err(err) => {
                stats.record_failure(&basename, &err.to_string());
                sink.emit(PipelineEvent::ImageFailed {
                    basename,
                    stage: err.stage(),
                    error: err.to_string(),
                });
            }
        }
    }

    store.save(state_dir)?;
    let report = stats.finish(sink.warnings());
    report.save(state_dir)?;
    sink.emit(PipelineEvent::RunCompleted {
        processed: report.processed,
        skipped: report.skipped,
        failed: report.failed,
        warnings: report.warnings,
        bytes_saved: report.size_saved,
        compression_ratio: report.compression_ratio.clone(),
        duration_secs: report.duration_seconds,
    });

    Ok(report)
}

/// Process one image end to end and build its store record.
///
/// Local variant files are deleted as soon as their upload concludes,
/// whether it succeeded or not; the hosted copies are the durable output.
/// Variants already uploaded when a later stage fails stay on the host,
/// they are simply unreferenced until the image is reprocessed.
fn process_image<B: ImageBackend, H: MediaHost>(
    backend: &B,
    host: &H,
    source: &Path,
    config: &PipelineConfig,
    policy: &RetryPolicy,
    api_key: &str,
    sink: &dyn EventSink,
) -> Result<ImageRecord, ImageError> {
    let basename = discover::basename(source);

    let analysis = policy
        .run(sink, &format!("analyze {basename}"), || {
            backend.analyze(source)
        })
        .map_err(ImageError::Analysis)?;

    let mut versions = BTreeMap::new();
    for profile in &config.profiles {
        let label = format!("{basename} [{}]", profile.name);

        let variant = match policy.run(sink, &format!("optimize {label}"), || {
            optimize(backend, source, profile, &analysis)
        }) {
            Ok(variant) => variant,
            Err(err) => {
                // A failed transform can still leave a partial file behind.
                remove_variant(&variant_path(source, &profile.suffix), sink);
                return Err(ImageError::Optimization {
                    profile: profile.name.clone(),
                    source: err,
                });
            }
        };

        sink.emit(PipelineEvent::VariantGenerated {
            basename: basename.clone(),
            profile: profile.name.clone(),
            width: variant.measure.width,
            height: variant.measure.height,
            byte_size: variant.measure.byte_size,
        });

        let uploaded = policy.run(sink, &format!("upload {label}"), || {
            host.upload(&variant.output_path, api_key)
        });
        remove_variant(&variant.output_path, sink);
        let url = uploaded.map_err(|err| ImageError::Upload {
            profile: profile.name.clone(),
            source: err,
        })?;

        sink.emit(PipelineEvent::VariantUploaded {
            basename: basename.clone(),
            profile: profile.name.clone(),
            url: url.clone(),
        });

        versions.insert(
            profile.name.clone(),
            VariantRecord {
                hosted_url: url,
                dimensions: VariantDimensions {
                    width: variant.measure.width,
                    height: variant.measure.height,
                },
                byte_size: variant.measure.byte_size,
                format: OUTPUT_FORMAT.to_string(),
                optimization: OptimizationInfo {
                    compression_ratio_percent: compression_ratio_percent(
                        analysis.byte_size,
                        variant.measure.byte_size,
                    ),
                    original_format: analysis.format.clone(),
                    color_profile: analysis.color_space.clone(),
                },
            },
        );
    }

    Ok(ImageRecord {
        versions,
        metadata: analysis,
        processed_at: Utc::now(),
    })
}

/// Delete a variant file. A file that is already gone is fine; any other
/// error becomes a cleanup warning rather than failing the image.
fn remove_variant(path: &Path, sink: &dyn EventSink) {
    if let Err(err) = std::fs::remove_file(path)
        && err.kind() != io::ErrorKind::NotFound
    {
        sink.emit(PipelineEvent::CleanupFailed {
            path: path.display().to_string(),
            error: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    use crate::events::{Level, MemorySink, NullSink};
    use crate::imaging::MockBackend;
    use crate::report::{
        CLEANUP_REPORT_FILENAME, CleanupReport, PROCESSING_REPORT_FILENAME, ProcessingReport,
    };
    use crate::store::STORE_FILENAME;
    use crate::upload::tests::MockHost;

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        // Stock backoff would sleep for seconds between mock retries.
        config.retry.base_delay_ms = 0;
        config
    }

    fn tree_with(names: &[&str]) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("content");
        fs::create_dir(&root).unwrap();
        for name in names {
            fs::write(root.join(name), b"raw image bytes").unwrap();
        }
        (tmp, root)
    }

    fn state_dir(tmp: &TempDir) -> PathBuf {
        tmp.path().join("state")
    }

    fn bare_record() -> ImageRecord {
        ImageRecord {
            versions: BTreeMap::new(),
            metadata: MockBackend::default_metadata(),
            processed_at: Utc::now(),
        }
    }

    fn read_processing_report(state: &Path) -> ProcessingReport {
        let json = fs::read_to_string(state.join(PROCESSING_REPORT_FILENAME)).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    // ==========================================================================
    // Full runs
    // ==========================================================================

    #[test]
    fn run_processes_every_profile_and_records_the_image() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        let backend = MockBackend::new();
        let host = MockHost::new();

        let report = run_with(
            &backend,
            &host,
            &root,
            &state,
            &test_config(),
            "key-123",
            &NullSink,
        )
        .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.total_size_before, 1_000_000);
        assert_eq!(report.total_size_after, 300_000);

        let store = MappingStore::load(&state).unwrap();
        let record = store.get("photo.jpg").unwrap();
        assert_eq!(record.versions.len(), 3);
        assert_eq!(
            record.versions["small"].hosted_url,
            "https://cdn.test/photo-small.avif"
        );
        assert_eq!(record.versions["small"].byte_size, 100_000);
        assert_eq!(record.versions["small"].format, "avif");
        assert_eq!(
            record.versions["small"].optimization.compression_ratio_percent,
            "90.00"
        );
        assert_eq!(record.metadata, MockBackend::default_metadata());
    }

    #[test]
    fn variant_files_are_gone_after_the_run() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        let backend = MockBackend::new();
        let host = MockHost::new();

        run_with(
            &backend,
            &host,
            &root,
            &state,
            &test_config(),
            "key-123",
            &NullSink,
        )
        .unwrap();

        for suffix in ["-small", "-medium", "-large"] {
            assert!(!root.join(format!("photo{suffix}.avif")).exists());
        }

        let names: Vec<String> = host
            .uploads()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            ["photo-small.avif", "photo-medium.avif", "photo-large.avif"]
        );
        assert!(host.api_keys().iter().all(|k| k == "key-123"));
    }

    #[test]
    fn run_writes_store_and_both_reports() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);

        run_with(
            &MockBackend::new(),
            &MockHost::new(),
            &root,
            &state,
            &test_config(),
            "k",
            &NullSink,
        )
        .unwrap();

        assert!(state.join(STORE_FILENAME).exists());
        assert!(state.join(CLEANUP_REPORT_FILENAME).exists());

        let report = read_processing_report(&state);
        assert_eq!(report.processed, 1);
        assert_eq!(report.total_size_before, 1_000_000);
        assert_eq!(report.total_size_after, 300_000);
        assert_eq!(report.size_saved, 700_000);
        assert_eq!(report.compression_ratio, "70.00");
        assert_eq!(report.warnings, 0);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn run_emits_the_event_sequence() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        let sink = MemorySink::new();

        run_with(
            &MockBackend::new(),
            &MockHost::new(),
            &root,
            &state,
            &test_config(),
            "k",
            &sink,
        )
        .unwrap();

        let events = sink.events();
        assert!(matches!(
            events[0],
            PipelineEvent::RunStarted { candidates: 1, .. }
        ));
        assert!(matches!(events[1], PipelineEvent::StorePruned { .. }));
        assert!(matches!(
            events[2],
            PipelineEvent::ImageStarted {
                index: 1,
                total: 1,
                ..
            }
        ));
        assert!(matches!(
            events[events.len() - 2],
            PipelineEvent::ImageCompleted { variants: 3, .. }
        ));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::RunCompleted { processed: 1, .. })
        ));

        let generated = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::VariantGenerated { .. }))
            .count();
        let uploaded = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::VariantUploaded { .. }))
            .count();
        assert_eq!(generated, 3);
        assert_eq!(uploaded, 3);
    }

    #[test]
    fn second_run_skips_processed_images() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);

        run_with(
            &MockBackend::new(),
            &MockHost::new(),
            &root,
            &state,
            &test_config(),
            "k",
            &NullSink,
        )
        .unwrap();

        let host = MockHost::new();
        let sink = MemorySink::new();
        let report = run_with(
            &MockBackend::new(),
            &host,
            &root,
            &state,
            &test_config(),
            "k",
            &sink,
        )
        .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 1);
        assert!(host.uploads().is_empty());
        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, PipelineEvent::ImageSkipped { .. }))
        );
    }

    #[test]
    fn empty_tree_completes_with_zero_stats() {
        let (tmp, root) = tree_with(&[]);
        let state = state_dir(&tmp);
        let sink = MemorySink::new();

        let report = run_with(
            &MockBackend::new(),
            &MockHost::new(),
            &root,
            &state,
            &test_config(),
            "k",
            &sink,
        )
        .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.compression_ratio, "0.00");
        assert!(state.join(PROCESSING_REPORT_FILENAME).exists());
        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, PipelineEvent::RunCompleted { processed: 0, .. }))
        );
    }

    // ==========================================================================
    // Failure isolation
    // ==========================================================================

    #[test]
    fn upload_failure_keeps_the_image_out_of_the_store() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        let backend = MockBackend::new();
        let host = MockHost::failing_when("-medium");

        let report = run_with(
            &backend,
            &host,
            &root,
            &state,
            &test_config(),
            "k",
            &NullSink,
        )
        .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.failed, 1);
        assert!(MappingStore::load(&state).unwrap().is_empty());

        // small uploaded once, medium tried three times, large never reached
        assert_eq!(host.uploads().len(), 4);

        // Every generated variant file is cleaned up either way.
        for suffix in ["-small", "-medium", "-large"] {
            assert!(!root.join(format!("photo{suffix}.avif")).exists());
        }
    }

    #[test]
    fn retries_surface_as_warnings_in_the_report() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        let sink = MemorySink::new();

        run_with(
            &MockBackend::new(),
            &MockHost::failing_when("-medium"),
            &root,
            &state,
            &test_config(),
            "k",
            &sink,
        )
        .unwrap();

        // Two retries were scheduled before the third attempt failed for good.
        assert_eq!(sink.count_at(Level::Warn), 2);

        let report = read_processing_report(&state);
        assert_eq!(report.warnings, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].image, "photo.jpg");
        assert!(report.errors[0].error.contains("Upload failed [medium]"));
        assert!(report.errors[0].error.contains("500"));

        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, PipelineEvent::ImageFailed { stage: "upload", .. }))
        );
    }

    #[test]
    fn retry_events_name_the_operation_and_profile() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        let sink = MemorySink::new();

        run_with(
            &MockBackend::new(),
            &MockHost::failing_when("-medium"),
            &root,
            &state,
            &test_config(),
            "k",
            &sink,
        )
        .unwrap();

        let operations: Vec<String> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::RetryScheduled { operation, .. } => Some(operation.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            operations,
            ["upload photo.jpg [medium]", "upload photo.jpg [medium]"]
        );
    }

    #[test]
    fn one_bad_image_does_not_sink_the_others() {
        let (tmp, root) = tree_with(&["broken.jpg", "fine.jpg"]);
        let state = state_dir(&tmp);
        let backend = MockBackend::failing_analyze("broken");
        let host = MockHost::new();
        let sink = MemorySink::new();

        let report = run_with(
            &backend,
            &host,
            &root,
            &state,
            &test_config(),
            "k",
            &sink,
        )
        .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);

        let store = MappingStore::load(&state).unwrap();
        assert!(store.contains("fine.jpg"));
        assert!(!store.contains("broken.jpg"));

        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, PipelineEvent::ImageFailed { stage: "analysis", .. }))
        );
        // The second image is still announced with its position in the run.
        assert!(sink.events().iter().any(|e| matches!(
            e,
            PipelineEvent::ImageStarted {
                index: 2,
                total: 2,
                ..
            }
        )));
    }

    #[test]
    fn transform_failure_records_the_optimization_stage() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        let backend = MockBackend::failing_transform("photo");
        let host = MockHost::new();
        let sink = MemorySink::new();

        let report = run_with(
            &backend,
            &host,
            &root,
            &state,
            &test_config(),
            "k",
            &sink,
        )
        .unwrap();

        assert_eq!(report.failed, 1);
        assert!(host.uploads().is_empty());
        assert!(MappingStore::load(&state).unwrap().is_empty());
        assert!(sink.events().iter().any(|e| matches!(
            e,
            PipelineEvent::ImageFailed {
                stage: "optimization",
                ..
            }
        )));
        // The two retry warnings and nothing else: the failed transform
        // wrote no file, so cleanup stayed silent.
        assert_eq!(sink.count_at(Level::Warn), 2);
    }

    // ==========================================================================
    // Reconciliation
    // ==========================================================================

    #[test]
    fn stale_entries_are_pruned_before_processing() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        fs::create_dir_all(&state).unwrap();

        let mut seeded = MappingStore::empty();
        seeded.insert("photo.jpg".to_string(), bare_record());
        seeded.insert("deleted.jpg".to_string(), bare_record());
        seeded.save(&state).unwrap();

        let sink = MemorySink::new();
        let report = run_with(
            &MockBackend::new(),
            &MockHost::new(),
            &root,
            &state,
            &test_config(),
            "k",
            &sink,
        )
        .unwrap();

        // photo.jpg survives the prune and is then skipped, not reprocessed.
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 1);

        let store = MappingStore::load(&state).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("photo.jpg"));

        let json = fs::read_to_string(state.join(CLEANUP_REPORT_FILENAME)).unwrap();
        let cleanup: CleanupReport = serde_json::from_str(&json).unwrap();
        assert_eq!(cleanup.removed, 1);
        assert_eq!(cleanup.retained, 1);

        assert!(sink.events().iter().any(|e| matches!(
            e,
            PipelineEvent::StorePruned {
                removed: 1,
                retained: 1,
                ..
            }
        )));
    }

    // ==========================================================================
    // Fatal errors
    // ==========================================================================

    #[test]
    fn corrupt_store_aborts_the_run() {
        let (tmp, root) = tree_with(&["photo.jpg"]);
        let state = state_dir(&tmp);
        fs::create_dir_all(&state).unwrap();
        fs::write(state.join(STORE_FILENAME), "not json").unwrap();

        let result = run_with(
            &MockBackend::new(),
            &MockHost::new(),
            &root,
            &state,
            &test_config(),
            "k",
            &NullSink,
        );

        assert!(matches!(
            result,
            Err(PipelineError::Store(StoreError::Corrupt(_, _)))
        ));
    }

    #[test]
    fn missing_root_aborts_the_run() {
        let tmp = TempDir::new().unwrap();

        let result = run_with(
            &MockBackend::new(),
            &MockHost::new(),
            &tmp.path().join("nope"),
            &state_dir(&tmp),
            &test_config(),
            "k",
            &NullSink,
        );

        assert!(matches!(result, Err(PipelineError::Discovery(_, _))));
    }

    // ==========================================================================
    // Error taxonomy
    // ==========================================================================

    #[test]
    fn image_errors_carry_their_stage() {
        let analysis = ImageError::Analysis(BackendError::Decode("bad header".to_string()));
        assert_eq!(analysis.stage(), "analysis");

        let optimization = ImageError::Optimization {
            profile: "small".to_string(),
            source: BackendError::Encode("panic".to_string()),
        };
        assert_eq!(optimization.stage(), "optimization");
        assert!(optimization.to_string().contains("[small]"));

        let upload = ImageError::Upload {
            profile: "large".to_string(),
            source: UploadError::MissingUrl,
        };
        assert_eq!(upload.stage(), "upload");
        assert!(upload.to_string().contains("no url field"));
    }
}
