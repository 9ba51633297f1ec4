//! Single-pass partitioning: materialise the whole table, write each group once.
//!
//! No writer outlives a single group write, so a failure part-way leaves the
//! files written so far complete and the rest absent.

use super::{
    drop_index_columns, ensure_ticker_column, group_by_ticker, group_ticker, write_parquet,
    FileNames, PartitionOptions, PartitionSummary,
};
use crate::error::{PipelineError, Result};
use crate::profiling::ProfileScope;
use crate::progress::{PipelineProgress, ProgressUnit};
use polars::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub(crate) fn run(
    source: &Path,
    output_dir: &Path,
    opts: &PartitionOptions,
    progress: &dyn PipelineProgress,
) -> Result<PartitionSummary> {
    let table = load_source(source)?;
    ensure_ticker_column(&table, &opts.ticker_column)?;
    info!(rows = table.height(), columns = table.width(), "source table loaded");

    let groups = group_by_ticker(&table, &opts.ticker_column)?;
    drop(table);

    let null_rows: usize = groups
        .iter()
        .map(|g| match group_ticker(g, &opts.ticker_column) {
            Ok(None) => g.height(),
            _ => 0,
        })
        .sum();
    let total = groups.len() - usize::from(null_rows > 0);

    progress.on_start("Writing ticker files", total, ProgressUnit::Tickers);

    let mut names = FileNames::new();
    let mut summary = PartitionSummary {
        tickers: 0,
        rows_written: 0,
        rows_skipped: 0,
        files_written: 0,
    };

    for mut group in groups {
        let Some(ticker) = group_ticker(&group, &opts.ticker_column)? else {
            warn!(rows = group.height(), "skipping rows with a null ticker");
            summary.rows_skipped += group.height();
            continue;
        };

        let file_name = names.assign(&ticker)?;
        let path = output_dir.join(&file_name);
        write_parquet(&mut group, &path, opts.compression)?;
        debug!(ticker = %ticker, rows = group.height(), "wrote ticker file");

        summary.tickers += 1;
        summary.rows_written += group.height();
        progress.on_advance(summary.tickers, total);
    }

    progress.on_finish(summary.tickers, total);
    Ok(summary)
}

/// Read the full source table and strip index columns.
fn load_source(source: &Path) -> Result<DataFrame> {
    let _scope = ProfileScope::new("load_source");

    let file = fs::File::open(source).map_err(PipelineError::io(source))?;
    let df = ParquetReader::new(file).finish()?;
    drop_index_columns(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    fn write_source(dir: &Path, mut df: DataFrame) -> std::path::PathBuf {
        let path = dir.join("source.parquet");
        let file = fs::File::create(&path).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();
        path
    }

    fn read(path: &Path) -> DataFrame {
        ParquetReader::new(fs::File::open(path).unwrap())
            .finish()
            .unwrap()
    }

    #[test]
    fn writes_one_file_per_ticker_in_source_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let source = write_source(
            dir.path(),
            df!(
                "Ticker" => ["AAPL", "MSFT", "AAPL", "MSFT", "AAPL"],
                "Volume" => [10i64, 20, 30, 40, 50]
            )
            .unwrap(),
        );

        let summary = run(&source, &out, &PartitionOptions::default(), &NoProgress).unwrap();
        assert_eq!(summary.tickers, 2);
        assert_eq!(summary.rows_written, 5);
        assert_eq!(summary.rows_skipped, 0);

        let aapl = read(&out.join("AAPL.parquet"));
        let volumes: Vec<i64> = aapl
            .column("Volume")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(volumes, vec![10, 30, 50]);
    }

    #[test]
    fn null_tickers_are_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let source = write_source(
            dir.path(),
            df!(
                "Ticker" => [Some("AAPL"), None, None],
                "Volume" => [1i64, 2, 3]
            )
            .unwrap(),
        );

        let summary = run(&source, &out, &PartitionOptions::default(), &NoProgress).unwrap();
        assert_eq!(summary.tickers, 1);
        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.rows_skipped, 2);
        assert!(out.join("AAPL.parquet").exists());
    }

    #[test]
    fn colliding_file_names_abort_without_merging() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let source = write_source(
            dir.path(),
            df!(
                "Ticker" => ["A/B", "MSFT", "A\\B"],
                "Volume" => [1i64, 2, 3]
            )
            .unwrap(),
        );

        let err = run(&source, &out, &PartitionOptions::default(), &NoProgress).unwrap_err();
        match err {
            PipelineError::FileNameCollision {
                first,
                second,
                file_name,
            } => {
                assert_eq!(first, "A/B");
                assert_eq!(second, "A\\B");
                assert_eq!(file_name, "A_B.parquet");
            }
            other => panic!("expected a collision, got {other}"),
        }

        // The first owner's file is intact and holds only its own rows.
        let a_b = read(&out.join("A_B.parquet"));
        assert_eq!(a_b.height(), 1);
        assert!(out.join("MSFT.parquet").exists());
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(
            &dir.path().join("nope.parquet"),
            dir.path(),
            &PartitionOptions::default(),
            &NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
