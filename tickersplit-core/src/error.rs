//! Structured error types for every pipeline step.
//!
//! These are displayable as-is on the CLI; the binary wraps them in `anyhow`
//! for step context.

use polars::prelude::PolarsError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("not authorized to download {0} (set KAGGLE_USERNAME/KAGGLE_KEY or ~/.kaggle/kaggle.json)")]
    Unauthorized(String),

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Polars(#[from] PolarsError),

    #[error("source table has no '{column}' column")]
    MissingColumn { column: String },

    #[error("tickers '{first}' and '{second}' both map to file name '{file_name}'")]
    FileNameCollision {
        first: String,
        second: String,
        file_name: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("profile report: {0}")]
    Report(String),
}

impl PipelineError {
    /// Adapter for `map_err` that attaches the path an I/O call was made on.
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
        move |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
