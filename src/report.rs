//! Run statistics and machine-readable reports.
//!
//! The pipeline accumulates counters in [`RunStatistics`] while it works and
//! derives a [`ProcessingReport`] at the end; store reconciliation produces a
//! [`CleanupReport`]. Both documents are written into the state directory as
//! pretty-printed JSON, overwritten on every run:
//!
//! ```text
//! .pixlift/
//! ├── mapping.json
//! ├── cleanup-report.json
//! └── processing-report.json
//! ```
//!
//! Byte accounting: `total_size_before` sums the original file size of every
//! successfully processed image (counted once per image), `total_size_after`
//! sums the uploaded variant sizes. `size_saved` is signed; a run that inflates
//! its sources reports a negative number rather than clamping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::imaging::{bytes_saved, compression_ratio_percent};

/// Name of the processing report file within the state directory.
pub const PROCESSING_REPORT_FILENAME: &str = "processing-report.json";

/// Name of the cleanup report file within the state directory.
pub const CLEANUP_REPORT_FILENAME: &str = "cleanup-report.json";

/// One failed image: which file, what went wrong, when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub image: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of pruning the mapping store against the current source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Entries dropped because their source image no longer exists.
    pub removed: u32,
    /// Entries kept.
    pub retained: u32,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
}

impl CleanupReport {
    /// Write the report into the state directory.
    pub fn save(&self, state_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(cleanup_report_path(state_dir), json)
    }
}

/// End-of-run summary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub processed: u32,
    pub skipped: u32,
    pub failed: u32,
    pub total_size_before: u64,
    pub total_size_after: u64,
    /// `total_size_before - total_size_after`; negative when variants grew.
    pub size_saved: i64,
    /// Percentage of bytes saved, `"{:.2}"` rendering.
    pub compression_ratio: String,
    /// Count of warn-level events observed during the run.
    pub warnings: u32,
    pub errors: Vec<ErrorEntry>,
    pub duration_seconds: f64,
}

impl ProcessingReport {
    /// Write the report into the state directory.
    pub fn save(&self, state_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(processing_report_path(state_dir), json)
    }
}

/// Resolve the processing report path for a state directory.
pub fn processing_report_path(state_dir: &Path) -> PathBuf {
    state_dir.join(PROCESSING_REPORT_FILENAME)
}

/// Resolve the cleanup report path for a state directory.
pub fn cleanup_report_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CLEANUP_REPORT_FILENAME)
}

/// Mutable counters the pipeline carries through a run.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub processed: u32,
    pub skipped: u32,
    pub failed: u32,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub errors: Vec<ErrorEntry>,
    started: Instant,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            processed: 0,
            skipped: 0,
            failed: 0,
            bytes_before: 0,
            bytes_after: 0,
            errors: Vec::new(),
            started: Instant::now(),
        }
    }

    /// One image fully processed: count its original size once and the total
    /// uploaded bytes of all its variants.
    pub fn record_success(&mut self, original_bytes: u64, uploaded_bytes: u64) {
        self.processed += 1;
        self.bytes_before += original_bytes;
        self.bytes_after += uploaded_bytes;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// One image failed; its sizes do not enter the byte totals.
    pub fn record_failure(&mut self, image: &str, error: &str) {
        self.failed += 1;
        self.errors.push(ErrorEntry {
            image: image.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Derive the final report. `warnings` is the warn-level event count
    /// observed by the sink wrapper during the run.
    pub fn finish(&self, warnings: u32) -> ProcessingReport {
        ProcessingReport {
            processed: self.processed,
            skipped: self.skipped,
            failed: self.failed,
            total_size_before: self.bytes_before,
            total_size_after: self.bytes_after,
            size_saved: bytes_saved(self.bytes_before, self.bytes_after),
            compression_ratio: compression_ratio_percent(self.bytes_before, self.bytes_after),
            warnings,
            errors: self.errors.clone(),
            duration_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}
