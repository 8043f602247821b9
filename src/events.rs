//! Structured pipeline events and the sinks that observe them.
//!
//! The pipeline never logs to a global logger. Every entry point takes an
//! [`EventSink`] and reports progress, warnings, and failures as typed
//! [`PipelineEvent`] values. The binary wires in a console sink (see
//! [`output`](crate::output)); tests wire in [`MemorySink`] and assert on the
//! recorded events. Severity filtering is the sink's job, which keeps event
//! emission unconditional and cheap to reason about.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Event severity. Declaration order is significant: `Error < Warn < Info <
/// Debug`, so a sink showing everything at `Info` and below hides `Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }
}

/// Everything the pipeline reports while running.
///
/// Paths and errors are carried as strings: events cross the sink boundary as
/// values and get formatted or recorded, never acted upon.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted {
        root: String,
        candidates: usize,
    },
    StorePruned {
        removed: usize,
        retained: usize,
        duration_secs: f64,
    },
    ImageSkipped {
        basename: String,
    },
    ImageStarted {
        basename: String,
        index: usize,
        total: usize,
    },
    VariantGenerated {
        basename: String,
        profile: String,
        width: u32,
        height: u32,
        byte_size: u64,
    },
    VariantUploaded {
        basename: String,
        profile: String,
        url: String,
    },
    /// A retriable operation failed and will run again after the wait.
    /// Emitted before the sleep, once per retried failure.
    RetryScheduled {
        operation: String,
        attempt: u32,
        max_attempts: u32,
        wait_ms: u64,
        error: String,
    },
    /// A local variant file could not be removed after its upload concluded.
    CleanupFailed {
        path: String,
        error: String,
    },
    ImageCompleted {
        basename: String,
        variants: usize,
        bytes_before: u64,
        bytes_after: u64,
    },
    /// The image's processing failed past its retry budgets; the pipeline
    /// records the error and moves on to the next image.
    ImageFailed {
        basename: String,
        stage: &'static str,
        error: String,
    },
    RunCompleted {
        processed: u32,
        skipped: u32,
        failed: u32,
        warnings: u32,
        bytes_saved: i64,
        compression_ratio: String,
        duration_secs: f64,
    },
}

impl PipelineEvent {
    pub fn level(&self) -> Level {
        match self {
            PipelineEvent::ImageFailed { .. } => Level::Error,
            PipelineEvent::RetryScheduled { .. } | PipelineEvent::CleanupFailed { .. } => {
                Level::Warn
            }
            PipelineEvent::ImageSkipped { .. } | PipelineEvent::VariantGenerated { .. } => {
                Level::Debug
            }
            _ => Level::Info,
        }
    }
}

/// Observer for pipeline events. Implementations must be `Sync`: one sink is
/// shared by reference for the whole run.
pub trait EventSink: Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Sink that discards everything. For callers that only want the return value.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Sink that records every event behind a mutex, for test assertions.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_at(&self, level: Level) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level() == level)
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Forwarding sink that tallies warn-level events.
///
/// The orchestrator wraps the caller's sink in one of these so run statistics
/// can report how many warnings (retries, cleanup misses) the run produced
/// without every emitter threading a counter around.
pub struct CountingSink<'a> {
    inner: &'a dyn EventSink,
    warnings: AtomicU32,
}

impl<'a> CountingSink<'a> {
    pub fn new(inner: &'a dyn EventSink) -> Self {
        Self {
            inner,
            warnings: AtomicU32::new(0),
        }
    }

    pub fn warnings(&self) -> u32 {
        self.warnings.load(Ordering::Relaxed)
    }
}

impl EventSink for CountingSink<'_> {
    fn emit(&self, event: PipelineEvent) {
        if event.level() == Level::Warn {
            self.warnings.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.emit(event);
    }
}
