//! Single-line terminal progress bar.
//!
//! Redraws in place with `\r` on stdout:
//! `Writing ticker files [#########-----------]  4521/9315 tickers 00:01:02 <00:01:05 72.92 tickers/s`

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tickersplit_core::progress::format_clock;
use tickersplit_core::{PipelineProgress, ProgressSnapshot, ProgressUnit};

const BAR_WIDTH: usize = 30;

/// Redraws at most this often, except for the final frame.
const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

pub struct TerminalProgress {
    description: RefCell<String>,
    unit: Cell<ProgressUnit>,
    started: Cell<Instant>,
    last_draw: Cell<Option<Instant>>,
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            description: RefCell::new(String::new()),
            unit: Cell::new(ProgressUnit::Tickers),
            started: Cell::new(Instant::now()),
            last_draw: Cell::new(None),
        }
    }

    fn draw(&self, processed: usize, total: usize, force: bool) {
        let now = Instant::now();
        if !force {
            if let Some(last) = self.last_draw.get() {
                if now.duration_since(last) < REDRAW_INTERVAL {
                    return;
                }
            }
        }
        self.last_draw.set(Some(now));

        let snapshot = ProgressSnapshot::new(processed, total, now - self.started.get());
        let line = render_line(&self.description.borrow(), &snapshot, self.unit.get());
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{line}");
        let _ = out.flush();
    }
}

impl PipelineProgress for TerminalProgress {
    fn on_fetched(&self, path: &Path) {
        println!("saved dataset at: {}", path.display());
    }

    fn on_start(&self, description: &str, total: usize, unit: ProgressUnit) {
        *self.description.borrow_mut() = description.to_string();
        self.unit.set(unit);
        self.started.set(Instant::now());
        self.last_draw.set(None);
        self.draw(0, total, true);
    }

    fn on_advance(&self, processed: usize, total: usize) {
        self.draw(processed, total, processed >= total);
    }

    fn on_finish(&self, processed: usize, total: usize) {
        self.draw(processed, total, true);
        println!();
    }
}

/// Render one frame of the progress line.
pub fn render_line(description: &str, s: &ProgressSnapshot, unit: ProgressUnit) -> String {
    let filled = (s.fraction() * BAR_WIDTH as f64).round() as usize;
    let bar = format!(
        "{}{}",
        "#".repeat(filled.min(BAR_WIDTH)),
        "-".repeat(BAR_WIDTH - filled.min(BAR_WIDTH))
    );
    let eta = s
        .eta()
        .map(format_clock)
        .unwrap_or_else(|| "-:--:--".to_string());
    let width = s.total.to_string().len();

    format!(
        "{description} [{bar}] {:>width$}/{} {} {} <{} {:.2} {}/s",
        s.processed,
        s.total,
        unit.label(),
        format_clock(s.elapsed),
        eta,
        s.rate(),
        unit.label(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_columns() {
        let s = ProgressSnapshot::new(5, 10, Duration::from_secs(2));
        let line = render_line("Writing ticker files", &s, ProgressUnit::Tickers);
        assert_eq!(
            line,
            format!(
                "Writing ticker files [{}{}]  5/10 tickers 00:00:02 <00:00:02 2.50 tickers/s",
                "#".repeat(15),
                "-".repeat(15)
            )
        );
    }

    #[test]
    fn first_second_rate_uses_floor() {
        let s = ProgressSnapshot::new(3, 100, Duration::from_millis(250));
        let line = render_line("x", &s, ProgressUnit::Rows);
        assert!(line.ends_with("3.00 rows/s"), "{line}");
    }

    #[test]
    fn nothing_processed_has_unknown_eta() {
        let s = ProgressSnapshot::new(0, 9315, Duration::ZERO);
        let line = render_line("x", &s, ProgressUnit::Tickers);
        assert!(line.contains("<-:--:--"), "{line}");
        assert!(line.contains(&format!("[{}]", "-".repeat(BAR_WIDTH))));
    }
}
