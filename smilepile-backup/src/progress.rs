//! Progress reporting for export and restore.
//!
//! Engines drive a [`ProgressTracker`] through their phases; every change is
//! pushed to an optional callback owned by the caller. The callback runs on
//! the engine's task, so a UI must marshal it to its own thread.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A phase that occupies a fixed slice of the overall percentage.
pub trait ProgressPhase: Copy + Debug + Send + Sync {
    /// `(start, end)` of this phase in percent, `0.0..=100.0`
    fn span(&self) -> (f64, f64);
}

/// Snapshot delivered to progress callbacks
#[derive(Debug, Clone)]
pub struct Progress<P> {
    pub phase: P,

    /// Items processed in the current phase
    pub processed: usize,

    /// Items expected in the current phase (0 when unknown)
    pub total: usize,

    pub message: String,

    /// Non-fatal problems accumulated so far
    pub errors: Vec<String>,

    /// Overall completion (0-100)
    pub percent_complete: f64,
}

/// Caller-supplied progress sink
pub type ProgressCallback<P> = Arc<dyn Fn(&Progress<P>) + Send + Sync>;

/// Phase-aware progress tracker
pub struct ProgressTracker<P: ProgressPhase> {
    start_time: Instant,
    progress: Progress<P>,
    callback: Option<ProgressCallback<P>>,
}

impl<P: ProgressPhase> ProgressTracker<P> {
    pub fn new(phase: P, callback: Option<ProgressCallback<P>>) -> Self {
        Self {
            start_time: Instant::now(),
            progress: Progress {
                phase,
                processed: 0,
                total: 0,
                message: String::new(),
                errors: Vec::new(),
                percent_complete: phase.span().0,
            },
            callback,
        }
    }

    /// Enter a new phase with `total` expected items.
    pub fn enter(&mut self, phase: P, total: usize, message: impl Into<String>) {
        self.progress.phase = phase;
        self.progress.processed = 0;
        self.progress.total = total;
        self.progress.message = message.into();
        self.recompute();
        self.emit();
    }

    /// Mark one more item of the current phase as done.
    pub fn advance(&mut self, message: impl Into<String>) {
        self.set_processed(self.progress.processed + 1, message);
    }

    pub fn set_processed(&mut self, processed: usize, message: impl Into<String>) {
        let total = self.progress.total;
        self.update(processed, total, message);
    }

    /// Replace both counters, for phases whose total is only known late.
    pub fn update(&mut self, processed: usize, total: usize, message: impl Into<String>) {
        self.progress.processed = processed;
        self.progress.total = total;
        self.progress.message = message.into();
        self.recompute();
        self.emit();
    }

    /// Record a non-fatal problem; it travels with every later update.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.progress.errors.push(error.into());
    }

    pub fn phase(&self) -> P {
        self.progress.phase
    }

    pub fn progress(&self) -> &Progress<P> {
        &self.progress
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn recompute(&mut self) {
        let (start, end) = self.progress.phase.span();
        let fraction = if self.progress.total > 0 {
            (self.progress.processed as f64 / self.progress.total as f64).min(1.0)
        } else {
            0.0
        };
        self.progress.percent_complete = start + (end - start) * fraction;
    }

    fn emit(&self) {
        if let Some(callback) = &self.callback {
            callback(&self.progress);
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
