//! Console formatting for pipeline events, summaries, and listings.
//!
//! # Output Format
//!
//! A `run` prints events as they happen:
//!
//! ```text
//! ==> Optimizing content (3 candidates)
//! Store: pruned 1 stale entries, kept 2
//!   [1/3] photo.jpg
//!     small: 640x320, 97.7 KB
//!     small → https://cdn.example/photo-small.avif
//!     done: 3 variants, 2.4 MB → 512.1 KB
//!   beach.jpg: already hosted
//!   [3/3] broken.jpg
//!     retry 1/3 in 5000 ms: decode failed: bad header
//!     failed at analysis: Analysis failed: decode failed: bad header
//! ==> Done: 1 processed, 1 skipped, 1 failed (42.1s)
//! ```
//!
//! followed by the summary block:
//!
//! ```text
//! Processed 1, skipped 1, failed 1
//! 2.4 MB → 512.1 KB (saved 1.9 MB, 79.17%)
//! 2 warnings
//! Errors
//!     broken.jpg: Analysis failed: decode failed: bad header
//! ```
//!
//! # Architecture
//!
//! Each surface has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure — no I/O, no side effects. [`ConsoleSink`] is the
//! [`EventSink`] the binary plugs into the pipeline: it filters by severity
//! and prints [`format_event`] lines as events arrive.

use std::path::PathBuf;

use crate::discover;
use crate::events::{EventSink, Level, PipelineEvent};
use crate::report::{CleanupReport, ProcessingReport};
use crate::store::MappingStore;

// ============================================================================
// Event formatting
// ============================================================================

/// Format one pipeline event as display lines.
///
/// Run-level events are flush left; per-image headers are indented one stop,
/// per-variant and failure context two stops.
pub fn format_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::RunStarted { root, candidates } => {
            vec![format!("==> Optimizing {root} ({candidates} candidates)")]
        }
        PipelineEvent::StorePruned {
            removed, retained, ..
        } => {
            if *removed == 0 {
                vec![format!("Store: {retained} entries, nothing to prune")]
            } else {
                vec![format!(
                    "Store: pruned {removed} stale entries, kept {retained}"
                )]
            }
        }
        PipelineEvent::ImageSkipped { basename } => {
            vec![format!("  {basename}: already hosted")]
        }
        PipelineEvent::ImageStarted {
            basename,
            index,
            total,
        } => {
            vec![format!("  [{index}/{total}] {basename}")]
        }
        PipelineEvent::VariantGenerated {
            profile,
            width,
            height,
            byte_size,
            ..
        } => {
            vec![format!(
                "    {profile}: {width}x{height}, {}",
                human_bytes(*byte_size)
            )]
        }
        PipelineEvent::VariantUploaded { profile, url, .. } => {
            vec![format!("    {profile} \u{2192} {url}")]
        }
        PipelineEvent::RetryScheduled {
            attempt,
            max_attempts,
            wait_ms,
            error,
            ..
        } => {
            vec![format!(
                "    retry {attempt}/{max_attempts} in {wait_ms} ms: {error}"
            )]
        }
        PipelineEvent::CleanupFailed { path, error } => {
            vec![format!("    could not remove {path}: {error}")]
        }
        PipelineEvent::ImageCompleted {
            variants,
            bytes_before,
            bytes_after,
            ..
        } => {
            vec![format!(
                "    done: {variants} variants, {} \u{2192} {}",
                human_bytes(*bytes_before),
                human_bytes(*bytes_after)
            )]
        }
        PipelineEvent::ImageFailed { stage, error, .. } => {
            vec![format!("    failed at {stage}: {error}")]
        }
        PipelineEvent::RunCompleted {
            processed,
            skipped,
            failed,
            duration_secs,
            ..
        } => {
            vec![format!(
                "==> Done: {processed} processed, {skipped} skipped, {failed} failed ({duration_secs:.1}s)"
            )]
        }
    }
}

/// Console sink for the pipeline: formats each event and prints it, hiding
/// events below the configured severity. Warnings and errors go to stderr,
/// everything else to stdout.
pub struct ConsoleSink {
    pub min_level: Level,
}

impl ConsoleSink {
    pub fn new(min_level: Level) -> Self {
        Self { min_level }
    }

    /// Info-level sink, or debug-level when `verbose` is set.
    pub fn verbose(verbose: bool) -> Self {
        Self::new(if verbose { Level::Debug } else { Level::Info })
    }

    /// Display decision for one event: `None` when it falls below the
    /// severity floor, otherwise the stderr flag and the formatted lines.
    fn displayed(&self, event: &PipelineEvent) -> Option<(bool, Vec<String>)> {
        if event.level() > self.min_level {
            return None;
        }
        Some((event.level() <= Level::Warn, format_event(event)))
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: PipelineEvent) {
        let Some((to_stderr, lines)) = self.displayed(&event) else {
            return;
        };
        for line in lines {
            if to_stderr {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }
}

// ============================================================================
// Summaries
// ============================================================================

/// Format the end-of-run summary block from a processing report.
pub fn format_run_summary(report: &ProcessingReport) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!(
        "Processed {}, skipped {}, failed {}",
        report.processed, report.skipped, report.failed
    ));

    if report.processed > 0 {
        lines.push(format!(
            "{} \u{2192} {} (saved {}, {}%)",
            human_bytes(report.total_size_before),
            human_bytes(report.total_size_after),
            human_bytes_signed(report.size_saved),
            report.compression_ratio
        ));
    }

    if report.warnings > 0 {
        lines.push(format!("{} warnings", report.warnings));
    }

    if !report.errors.is_empty() {
        lines.push("Errors".to_string());
        for entry in &report.errors {
            lines.push(format!("    {}: {}", entry.image, entry.error));
        }
    }

    lines
}

/// Print the run summary to stdout.
pub fn print_run_summary(report: &ProcessingReport) {
    for line in format_run_summary(report) {
        println!("{}", line);
    }
}

/// Format the reconciliation summary from a cleanup report.
pub fn format_cleanup_summary(report: &CleanupReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Pruned {} stale entries, kept {}",
        report.removed, report.retained
    )];
    for error in &report.errors {
        lines.push(format!("    {}", error));
    }
    lines
}

/// Print the cleanup summary to stdout.
pub fn print_cleanup_summary(report: &CleanupReport) {
    for line in format_cleanup_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Discover listing
// ============================================================================

/// Format the `discover` listing: every candidate path, marking the ones the
/// store already hosts, with a pending tally at the end.
pub fn format_discover_listing(candidates: &[PathBuf], store: &MappingStore) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = 0;

    for path in candidates {
        let basename = discover::basename(path);
        if store.contains(&basename) {
            lines.push(format!("  {} (hosted)", path.display()));
        } else {
            pending += 1;
            lines.push(format!("  {}", path.display()));
        }
    }

    lines.push(format!(
        "{} images, {} pending upload",
        candidates.len(),
        pending
    ));
    lines
}

/// Print the discover listing to stdout.
pub fn print_discover_listing(candidates: &[PathBuf], store: &MappingStore) {
    for line in format_discover_listing(candidates, store) {
        println!("{}", line);
    }
}

// ============================================================================
// Byte rendering
// ============================================================================

/// Render a byte count with one decimal in the largest fitting unit.
///
/// ```
/// use pixlift::output::human_bytes;
/// assert_eq!(human_bytes(512), "512 B");
/// assert_eq!(human_bytes(14_540), "14.2 KB");
/// assert_eq!(human_bytes(2_516_582), "2.4 MB");
/// ```
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Signed variant for savings that can be negative (variants grew).
fn human_bytes_signed(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", human_bytes(bytes.unsigned_abs()))
    } else {
        human_bytes(bytes as u64)
    }
}

// ============================================================================
// Tests
// ============================================================================
