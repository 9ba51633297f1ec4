//! Profiling: named timing scopes aggregated into a persisted report.
//!
//! Scopes are cheap no-ops unless a session is active. While one is, each
//! `ProfileScope` records its wall time on drop under its name; the session
//! report lists call count and cumulative/min/max time per name, sorted by
//! cumulative time, and is written as JSON.
//!
//! # Usage
//!
//! ```
//! use tickersplit_core::profiling::{self, ProfileScope};
//!
//! profiling::start_session();
//! {
//!     let _scope = ProfileScope::new("expensive_operation");
//!     // Work happens here...
//! }
//! let report = profiling::finish_session();
//! assert!(report.scope("expensive_operation").is_some());
//! ```

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// File name the CLI persists session reports to.
pub const DEFAULT_REPORT_FILE: &str = "stats.prof";

static PROFILING_ENABLED: AtomicBool = AtomicBool::new(false);

fn global_recorder() -> &'static Mutex<ProfileRecorder> {
    static RECORDER: OnceLock<Mutex<ProfileRecorder>> = OnceLock::new();
    RECORDER.get_or_init(|| Mutex::new(ProfileRecorder::default()))
}

/// Check if a profiling session is currently active.
#[inline]
pub fn is_enabled() -> bool {
    PROFILING_ENABLED.load(Ordering::Relaxed)
}

/// Begin a session, discarding anything recorded before.
pub fn start_session() {
    if let Ok(mut recorder) = global_recorder().lock() {
        *recorder = ProfileRecorder::new();
    }
    PROFILING_ENABLED.store(true, Ordering::Relaxed);
}

/// End the active session and return what it recorded.
pub fn finish_session() -> ProfileReport {
    PROFILING_ENABLED.store(false, Ordering::Relaxed);
    match global_recorder().lock() {
        Ok(mut recorder) => std::mem::take(&mut *recorder).report(),
        Err(_) => ProfileRecorder::new().report(),
    }
}

/// Run `f` inside a session and persist the report to `path`.
///
/// The report is written whether or not `f` succeeded; `f`'s own result is
/// returned unchanged alongside the outcome of saving.
pub fn run_profiled<F, R>(path: &Path, f: F) -> (R, Result<ProfileReport>)
where
    F: FnOnce() -> R,
{
    start_session();
    let result = {
        let _scope = ProfileScope::new("pipeline");
        f()
    };
    let report = finish_session();
    let saved = report.save(path).map(|()| report);
    (result, saved)
}

/// Times the enclosing block; records on drop while a session is active.
pub struct ProfileScope {
    name: &'static str,
    start: Instant,
}

impl ProfileScope {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if is_enabled() {
            let elapsed = self.start.elapsed();
            if let Ok(mut recorder) = global_recorder().lock() {
                recorder.record(self.name, elapsed);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScopeStats {
    calls: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

/// Aggregates scope timings by name.
#[derive(Debug)]
pub struct ProfileRecorder {
    started_at: DateTime<Local>,
    started: Instant,
    scopes: BTreeMap<&'static str, ScopeStats>,
}

impl Default for ProfileRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRecorder {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            started: Instant::now(),
            scopes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        self.scopes
            .entry(name)
            .and_modify(|s| {
                s.calls += 1;
                s.total += elapsed;
                s.min = s.min.min(elapsed);
                s.max = s.max.max(elapsed);
            })
            .or_insert(ScopeStats {
                calls: 1,
                total: elapsed,
                min: elapsed,
                max: elapsed,
            });
    }

    pub fn report(self) -> ProfileReport {
        let mut scopes: Vec<ScopeReport> = self
            .scopes
            .into_iter()
            .map(|(name, s)| ScopeReport {
                name: name.to_string(),
                calls: s.calls,
                cumulative_ms: ms(s.total),
                mean_ms: ms(s.total) / s.calls as f64,
                min_ms: ms(s.min),
                max_ms: ms(s.max),
            })
            .collect();
        scopes.sort_by(|a, b| b.cumulative_ms.total_cmp(&a.cumulative_ms));

        ProfileReport {
            started_at: self.started_at,
            wall_ms: ms(self.started.elapsed()),
            scopes,
        }
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeReport {
    pub name: String,
    pub calls: u64,
    pub cumulative_ms: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub started_at: DateTime<Local>,
    pub wall_ms: f64,
    /// Sorted by cumulative time, largest first.
    pub scopes: Vec<ScopeReport>,
}

impl ProfileReport {
    pub fn scope(&self, name: &str) -> Option<&ScopeReport> {
        self.scopes.iter().find(|s| s.name == name)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| PipelineError::Report(e.to_string()))?;
        std::fs::write(path, json).map_err(PipelineError::io(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_aggregates_by_name() {
        let mut recorder = ProfileRecorder::new();
        recorder.record("write_ticker", Duration::from_millis(10));
        recorder.record("write_ticker", Duration::from_millis(30));
        recorder.record("load_source", Duration::from_millis(100));

        let report = recorder.report();
        assert_eq!(report.scopes.len(), 2);
        // Sorted by cumulative time.
        assert_eq!(report.scopes[0].name, "load_source");

        let write = report.scope("write_ticker").unwrap();
        assert_eq!(write.calls, 2);
        assert!((write.cumulative_ms - 40.0).abs() < 1e-6);
        assert!((write.mean_ms - 20.0).abs() < 1e-6);
        assert!((write.min_ms - 10.0).abs() < 1e-6);
        assert!((write.max_ms - 30.0).abs() < 1e-6);
    }

    #[test]
    fn run_profiled_persists_report_and_passes_result_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_REPORT_FILE);

        let (value, saved) = run_profiled(&path, || {
            let _scope = ProfileScope::new("unit_test_scope");
            42
        });

        assert_eq!(value, 42);
        let report = saved.unwrap();
        assert!(report.scope("unit_test_scope").is_some());
        assert!(report.scope("pipeline").is_some());
        assert!(!is_enabled());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["scopes"].as_array().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn save_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let report = ProfileRecorder::new().report();
        let err = report.save(&dir.path().join("missing/stats.prof")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
