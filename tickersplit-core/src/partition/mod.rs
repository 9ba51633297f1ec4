//! Split the source table into one Parquet file per ticker.
//!
//! Two strategies share the helpers here:
//! - single-pass (default): load everything, group once, one write per ticker
//! - chunked: stream row slices into per-ticker writers held open across chunks
//!
//! Grouping is stable and keeps first-appearance order of tickers, so row
//! order inside each output file matches the source.

pub mod chunked;
pub mod naming;
pub mod single_pass;

use crate::config::{Compression, PartitionConfig, PartitionStrategy};
use crate::error::{PipelineError, Result};
use crate::output::count_parquet_files;
use crate::progress::PipelineProgress;
use crate::profiling::ProfileScope;
use polars::prelude::*;
use std::fs;
use std::path::Path;

pub use naming::{sanitize_ticker, ticker_file_name, FileNames};

/// Column-name prefix pandas uses when it persists a row index.
const INDEX_COLUMN_PREFIX: &str = "__index_level_";

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOptions {
    pub strategy: PartitionStrategy,
    pub chunk_rows: usize,
    pub compression: Compression,
    pub ticker_column: String,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self::from_config(&PartitionConfig::default(), "Ticker")
    }
}

impl PartitionOptions {
    pub fn from_config(config: &PartitionConfig, ticker_column: &str) -> Self {
        Self {
            strategy: config.strategy,
            chunk_rows: config.chunk_rows,
            compression: config.compression,
            ticker_column: ticker_column.to_string(),
        }
    }
}

/// Outcome of a partition run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    /// Distinct tickers that received a file.
    pub tickers: usize,
    pub rows_written: usize,
    /// Rows dropped because their ticker was null.
    pub rows_skipped: usize,
    /// `*.parquet` files found by re-listing the output directory.
    pub files_written: usize,
}

/// Partition `source` into `output_dir` with the configured strategy.
///
/// `output_dir` must already exist (see `prepare_output_dir`).
pub fn partition(
    source: &Path,
    output_dir: &Path,
    opts: &PartitionOptions,
    progress: &dyn PipelineProgress,
) -> Result<PartitionSummary> {
    let _scope = ProfileScope::new("partition");

    let mut summary = match opts.strategy {
        PartitionStrategy::SinglePass => single_pass::run(source, output_dir, opts, progress)?,
        PartitionStrategy::Chunked => chunked::run(source, output_dir, opts, progress)?,
    };
    summary.files_written = count_parquet_files(output_dir)?;
    Ok(summary)
}

fn parquet_compression(c: Compression) -> ParquetCompression {
    match c {
        Compression::Snappy => ParquetCompression::Snappy,
        Compression::Zstd => ParquetCompression::Zstd(None),
        Compression::Lz4 => ParquetCompression::Lz4Raw,
        Compression::Uncompressed => ParquetCompression::Uncompressed,
    }
}

/// Drop pandas index columns so outputs carry only real data columns.
fn drop_index_columns(df: DataFrame) -> Result<DataFrame> {
    let index_cols: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.starts_with(INDEX_COLUMN_PREFIX))
        .map(|name| name.to_string())
        .collect();

    let mut df = df;
    for name in &index_cols {
        df = df.drop(name)?;
    }
    Ok(df)
}

fn ensure_ticker_column(df: &DataFrame, column: &str) -> Result<()> {
    if df.column(column).is_err() {
        return Err(PipelineError::MissingColumn {
            column: column.to_string(),
        });
    }
    Ok(())
}

/// Split `df` by ticker, keeping first-appearance order of tickers and
/// source order of rows within each group.
fn group_by_ticker(df: &DataFrame, column: &str) -> Result<Vec<DataFrame>> {
    Ok(df.partition_by_stable([column], true)?)
}

/// The ticker shared by every row of `group`; `None` for the null group.
fn group_ticker(group: &DataFrame, column: &str) -> Result<Option<String>> {
    let key = group.column(column)?.cast(&DataType::String)?;
    Ok(key.str()?.get(0).map(str::to_owned))
}

/// Write a whole DataFrame to a new Parquet file.
fn write_parquet(df: &mut DataFrame, path: &Path, compression: Compression) -> Result<()> {
    let _scope = ProfileScope::new("write_ticker");

    let file = fs::File::create(path).map_err(PipelineError::io(path))?;
    ParquetWriter::new(file)
        .with_compression(parquet_compression(compression))
        .finish(df)?;
    Ok(())
}
