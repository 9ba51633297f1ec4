//! End-to-end driver: locate → prepare → partition → cleanup.

use crate::config::PipelineConfig;
use crate::dataset::{locate, DatasetFetcher, LocatedSource};
use crate::error::{PipelineError, Result};
use crate::output::{cleanup_source, prepare_output_dir};
use crate::partition::{partition, PartitionOptions, PartitionSummary};
use crate::progress::PipelineProgress;
use std::path::PathBuf;
use tracing::info;

/// Per-invocation switches (as opposed to persistent configuration).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Delete the source file once partitioning succeeds.
    pub cleanup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub source: LocatedSource,
    pub output_dir: PathBuf,
    pub summary: PartitionSummary,
    pub source_removed: bool,
}

/// Run the whole pipeline once.
///
/// Any error aborts immediately; output files already written stay on disk.
pub fn run_pipeline(
    config: &PipelineConfig,
    fetcher: &dyn DatasetFetcher,
    progress: &dyn PipelineProgress,
    run: RunOptions,
) -> Result<PipelineReport> {
    config.validate()?;

    let handle = config.dataset_handle();
    let source = locate(&handle, &config.dataset.file, &config.data_dir, fetcher)?;
    if source.fetched {
        progress.on_fetched(&source.path);
    }

    let output_dir = config.output_dir();
    if source.path.starts_with(&output_dir) {
        return Err(PipelineError::Config(format!(
            "output directory {} would delete the source dataset {}",
            output_dir.display(),
            source.path.display()
        )));
    }
    prepare_output_dir(&output_dir)?;

    let opts = PartitionOptions::from_config(&config.partition, &config.ticker_column);
    let summary = partition(&source.path, &output_dir, &opts, progress)?;
    info!(
        tickers = summary.tickers,
        rows = summary.rows_written,
        skipped = summary.rows_skipped,
        files = summary.files_written,
        "partitioning complete"
    );

    let source_removed = cleanup_source(&source.path, run.cleanup)?;

    Ok(PipelineReport {
        source,
        output_dir,
        summary,
        source_removed,
    })
}
