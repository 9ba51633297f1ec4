//! Chunked partitioning: stream row slices into per-ticker writers.
//!
//! Memory stays bounded by `chunk_rows` plus one row group per open writer.
//! Writers stay open across chunks, so `WriterSet::finish_all` always runs
//! after the streaming loop, whether the loop succeeded or not, and every
//! file that was opened gets its footer.

use super::{
    drop_index_columns, ensure_ticker_column, group_by_ticker, group_ticker,
    parquet_compression, FileNames, PartitionOptions, PartitionSummary,
};
use crate::config::Compression;
use crate::error::{PipelineError, Result};
use crate::profiling::ProfileScope;
use crate::progress::{PipelineProgress, ProgressUnit};
use polars::io::parquet::write::BatchedWriter;
use polars::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub(crate) fn run(
    source: &Path,
    output_dir: &Path,
    opts: &PartitionOptions,
    progress: &dyn PipelineProgress,
) -> Result<PartitionSummary> {
    let total_rows = count_rows(source)?;
    info!(rows = total_rows, chunk_rows = opts.chunk_rows, "streaming source table");

    progress.on_start("Processing rows", total_rows, ProgressUnit::Rows);

    let mut writers = WriterSet::new(output_dir, opts.compression);
    let streamed = stream_chunks(source, total_rows, opts, &mut writers, progress);
    let finished = writers.finish_all();

    let mut summary = streamed?;
    summary.tickers = finished?;
    progress.on_finish(total_rows, total_rows);
    Ok(summary)
}

fn count_rows(source: &Path) -> Result<usize> {
    let file = fs::File::open(source).map_err(PipelineError::io(source))?;
    Ok(ParquetReader::new(file).num_rows()?)
}

fn stream_chunks(
    source: &Path,
    total_rows: usize,
    opts: &PartitionOptions,
    writers: &mut WriterSet<'_>,
    progress: &dyn PipelineProgress,
) -> Result<PartitionSummary> {
    let scan = LazyFrame::scan_parquet(source, ScanArgsParquet::default())?;
    let mut summary = PartitionSummary {
        tickers: 0,
        rows_written: 0,
        rows_skipped: 0,
        files_written: 0,
    };

    let mut offset = 0usize;
    while offset < total_rows {
        let len = opts.chunk_rows.min(total_rows - offset);
        let chunk = {
            let _scope = ProfileScope::new("load_chunk");
            scan.clone()
                .slice(offset as i64, len as IdxSize)
                .collect()?
        };
        let chunk = drop_index_columns(chunk)?;
        ensure_ticker_column(&chunk, &opts.ticker_column)?;

        for group in group_by_ticker(&chunk, &opts.ticker_column)? {
            match group_ticker(&group, &opts.ticker_column)? {
                Some(ticker) => {
                    writers.append(&ticker, &group)?;
                    summary.rows_written += group.height();
                }
                None => {
                    warn!(rows = group.height(), offset, "skipping rows with a null ticker");
                    summary.rows_skipped += group.height();
                }
            }
        }

        offset += chunk.height().max(1);
        progress.on_advance(offset.min(total_rows), total_rows);
    }

    Ok(summary)
}

/// One open batched writer per ticker.
struct WriterSet<'a> {
    dir: &'a Path,
    compression: Compression,
    names: FileNames,
    writers: HashMap<String, (PathBuf, BatchedWriter<fs::File>)>,
}

impl<'a> WriterSet<'a> {
    fn new(dir: &'a Path, compression: Compression) -> Self {
        Self {
            dir,
            compression,
            names: FileNames::new(),
            writers: HashMap::new(),
        }
    }

    /// Append `group` to the ticker's file, opening it on first sight with
    /// the group's schema.
    fn append(&mut self, ticker: &str, group: &DataFrame) -> Result<()> {
        let _scope = ProfileScope::new("write_ticker");

        if !self.writers.contains_key(ticker) {
            let path = self.dir.join(self.names.assign(ticker)?);
            let file = fs::File::create(&path).map_err(PipelineError::io(&path))?;
            let writer = ParquetWriter::new(file)
                .with_compression(parquet_compression(self.compression))
                .batched(&group.schema())?;
            debug!(ticker, path = %path.display(), "opened ticker writer");
            self.writers.insert(ticker.to_string(), (path, writer));
        }

        if let Some((_, writer)) = self.writers.get_mut(ticker) {
            writer.write_batch(group)?;
        }
        Ok(())
    }

    /// Finish every open writer. All writers are attempted; the first error
    /// is returned. On success returns how many files were finished.
    fn finish_all(&mut self) -> Result<usize> {
        let mut finished = 0;
        let mut first_err = None;
        for (ticker, (path, writer)) in self.writers.drain() {
            match writer.finish() {
                Ok(_) => finished += 1,
                Err(e) => {
                    warn!(ticker = %ticker, path = %path.display(), error = %e, "failed to finish writer");
                    first_err.get_or_insert(PipelineError::from(e));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(finished),
        }
    }
}

impl Drop for WriterSet<'_> {
    fn drop(&mut self) {
        if !self.writers.is_empty() {
            let _ = self.finish_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionStrategy;
    use crate::progress::NoProgress;
    use std::cell::RefCell;

    fn write_source(dir: &Path, mut df: DataFrame) -> PathBuf {
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

    fn chunked(rows: usize) -> PartitionOptions {
        PartitionOptions {
            strategy: PartitionStrategy::Chunked,
            chunk_rows: rows,
            ..PartitionOptions::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        advances: RefCell<Vec<usize>>,
    }

    impl PipelineProgress for Recorder {
        fn on_start(&self, _d: &str, total: usize, unit: ProgressUnit) {
            assert_eq!(unit, ProgressUnit::Rows);
            assert_eq!(total, 7);
        }
        fn on_advance(&self, processed: usize, _total: usize) {
            self.advances.borrow_mut().push(processed);
        }
        fn on_finish(&self, _processed: usize, _total: usize) {}
    }

    #[test]
    fn tickers_spanning_chunks_end_up_in_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let source = write_source(
            dir.path(),
            df!(
                "Ticker" => ["AAPL", "MSFT", "AAPL", "IBM", "AAPL", "MSFT", "IBM"],
                "Close" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]
            )
            .unwrap(),
        );

        let progress = Recorder::default();
        let summary = run(&source, &out, &chunked(3), &progress).unwrap();
        assert_eq!(summary.tickers, 3);
        assert_eq!(summary.rows_written, 7);
        assert_eq!(*progress.advances.borrow(), vec![3, 6, 7]);

        let aapl = read(&out.join("AAPL.parquet"));
        let closes: Vec<f64> = aapl
            .column("Close")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(closes, vec![1.0, 3.0, 5.0]);
        assert_eq!(read(&out.join("IBM.parquet")).height(), 2);
    }

    #[test]
    fn writers_are_finished_when_a_later_chunk_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let source = write_source(
            dir.path(),
            df!(
                "Ticker" => ["A/B", "MSFT", "A\\B"],
                "Close" => [1.0, 2.0, 3.0]
            )
            .unwrap(),
        );

        let err = run(&source, &out, &chunked(2), &NoProgress).unwrap_err();
        assert!(matches!(err, PipelineError::FileNameCollision { .. }));

        // Files opened before the failure are complete, readable Parquet.
        assert_eq!(read(&out.join("A_B.parquet")).height(), 1);
        assert_eq!(read(&out.join("MSFT.parquet")).height(), 1);
    }

    #[test]
    fn empty_source_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let empty: Vec<&str> = Vec::new();
        let closes: Vec<f64> = Vec::new();
        let source = write_source(
            dir.path(),
            df!("Ticker" => empty, "Close" => closes).unwrap(),
        );

        let summary = run(&source, &out, &chunked(10), &NoProgress).unwrap();
        assert_eq!(summary.tickers, 0);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }
}
