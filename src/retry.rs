//! Bounded retry with exponential backoff.
//!
//! Every analyzer, generator, and uploader call runs under a [`RetryPolicy`]:
//! up to `max_attempts` tries, doubling the wait between them (5s, 10s, 20s at
//! the defaults), no jitter. Each scheduled retry is announced through the
//! event sink before the wait, and when the budget runs out the *original*
//! error is returned unchanged so callers can still match on it.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use crate::events::{EventSink, PipelineEvent};

/// Sleep seam. Production blocks the pipeline thread; tests swap in a
/// recorder and assert the schedule without waiting.
trait Sleeper {
    fn sleep(&self, duration: Duration);
}

struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Retry budget for one category of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// A zero `max_attempts` is treated as 1: the operation always runs once.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `f` until it succeeds or the attempt budget is spent.
    ///
    /// `operation` is a short human-readable label ("upload photo.jpg
    /// [small]") carried in the retry events. The closure is `FnMut` so it
    /// can rebuild per-attempt state such as multipart request bodies.
    pub fn run<T, E: Display>(
        &self,
        sink: &dyn EventSink,
        operation: &str,
        f: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        self.run_with_sleeper(&ThreadSleeper, sink, operation, f)
    }

    fn run_with_sleeper<T, E: Display>(
        &self,
        sleeper: &dyn Sleeper,
        sink: &dyn EventSink,
        operation: &str,
        mut f: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts => {
                    let wait = self.backoff(attempt);
                    sink.emit(PipelineEvent::RetryScheduled {
                        operation: operation.to_string(),
                        attempt,
                        max_attempts: self.max_attempts,
                        wait_ms: wait.as_millis() as u64,
                        error: err.to_string(),
                    });
                    sleeper.sleep(wait);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Wait after the Nth failed attempt: `base * 2^(n-1)`, saturating.
    fn backoff(&self, failed_attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failed_attempt - 1))
    }
}
