//! Progress callbacks for the pipeline.
//!
//! The partitioner only talks to the `PipelineProgress` trait; rendering
//! lives in the binary. `ProgressSnapshot` holds the derived figures
//! (fraction, rate, ETA) so any renderer computes them the same way.

use std::path::Path;
use std::time::Duration;

/// What one unit of progress counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Tickers,
    Rows,
}

impl ProgressUnit {
    pub fn label(self) -> &'static str {
        match self {
            ProgressUnit::Tickers => "tickers",
            ProgressUnit::Rows => "rows",
        }
    }
}

/// Callbacks fired by the pipeline as it runs.
pub trait PipelineProgress {
    /// Called once when the source had to be downloaded.
    fn on_fetched(&self, _path: &Path) {}

    /// Called before the first unit of work.
    fn on_start(&self, description: &str, total: usize, unit: ProgressUnit);

    /// Called after each completed unit (or batch of units for rows).
    fn on_advance(&self, processed: usize, total: usize);

    /// Called once partitioning is done.
    fn on_finish(&self, processed: usize, total: usize);
}

/// Discards every event.
pub struct NoProgress;

impl PipelineProgress for NoProgress {
    fn on_start(&self, _description: &str, _total: usize, _unit: ProgressUnit) {}
    fn on_advance(&self, _processed: usize, _total: usize) {}
    fn on_finish(&self, _processed: usize, _total: usize) {}
}

/// Units per second, with elapsed time floored at one second.
pub fn throughput(processed: usize, elapsed: Duration) -> f64 {
    processed as f64 / elapsed.as_secs_f64().max(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn new(processed: usize, total: usize, elapsed: Duration) -> Self {
        Self {
            processed,
            total,
            elapsed,
        }
    }

    /// Completion in `[0, 1]`; an empty job counts as complete.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.processed.min(self.total)) as f64 / self.total as f64
    }

    pub fn rate(&self) -> f64 {
        throughput(self.processed, self.elapsed)
    }

    /// Estimated time remaining at the current rate; `None` until something
    /// has been processed.
    pub fn eta(&self) -> Option<Duration> {
        if self.processed == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.processed) as f64;
        let per_unit = self.elapsed.as_secs_f64() / self.processed as f64;
        Some(Duration::from_secs_f64(remaining * per_unit))
    }
}

/// `HH:MM:SS`, the way elapsed/remaining columns are shown.
pub fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
