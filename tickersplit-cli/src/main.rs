//! tickersplit CLI — fetch the stock dataset and write one Parquet file per ticker.
//!
//! Usage: `tickersplit [+cleanup] [+profile]`
//!
//! - `+cleanup` — delete the source dataset file after partitioning
//! - `+profile` — record scope timings and save them to `stats.prof`

mod progress;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tickersplit_core::profiling::{self, ProfileReport, DEFAULT_REPORT_FILE};
use tickersplit_core::{
    run_pipeline, KaggleFetcher, PipelineConfig, PipelineError, PipelineReport, RunOptions,
};

use crate::progress::TerminalProgress;

#[derive(Parser)]
#[command(
    name = "tickersplit",
    about = "Fetch the 9000-ticker stock dataset and split it into one Parquet file per ticker"
)]
struct Cli {
    /// Run tokens, accepted in any order.
    #[arg(value_enum)]
    tokens: Vec<Token>,

    /// TOML config file (defaults to $TICKERSPLIT_CONFIG, then ./tickersplit.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Token {
    /// Delete the source dataset after partitioning.
    #[value(name = "+cleanup")]
    Cleanup,
    /// Profile the run and save timings to stats.prof.
    #[value(name = "+profile")]
    Profile,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let run = RunOptions {
        cleanup: cli.tokens.contains(&Token::Cleanup),
    };

    let report = if cli.tokens.contains(&Token::Profile) {
        let report_path = Path::new(DEFAULT_REPORT_FILE);
        let (result, saved) = profiling::run_profiled(report_path, || execute(&config, run));
        settle_profiled(result, saved, report_path)?
    } else {
        execute(&config, run)?
    };

    println!("Created {} ticker files", report.summary.files_written);
    if report.summary.rows_skipped > 0 {
        println!(
            "Skipped {} rows with no ticker",
            report.summary.rows_skipped
        );
    }
    if report.source_removed {
        println!("Removed source dataset {}", report.source.path.display());
    }

    Ok(())
}

fn execute(config: &PipelineConfig, run: RunOptions) -> Result<PipelineReport> {
    let fetcher = KaggleFetcher::new(&config.fetch).context("building HTTP client")?;
    let progress = TerminalProgress::new();
    let report = run_pipeline(config, &fetcher, &progress, run).with_context(|| {
        format!(
            "splitting {} into {}",
            config.dataset_handle(),
            config.output_dir().display()
        )
    })?;
    Ok(report)
}

/// Merge a profiled run's outcome with the report save.
///
/// A pipeline failure is always the error returned; a failed save rides along
/// as context instead of replacing it.
fn settle_profiled<T>(
    result: Result<T>,
    saved: std::result::Result<ProfileReport, PipelineError>,
    report_path: &Path,
) -> Result<T> {
    match (result, saved) {
        (result, Ok(_)) => {
            println!("Profiling data saved to {}", report_path.display());
            result
        }
        (Err(e), Err(save_err)) => Err(e.context(format!(
            "profile not saved to {}: {save_err}",
            report_path.display()
        ))),
        (Ok(_), Err(save_err)) => Err(anyhow::Error::new(save_err)
            .context(format!("saving profile to {}", report_path.display()))),
    }
}

/// Logs go to stderr so they never interleave with the progress line.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
