//! tickersplit core — fetch a bundled stock dataset and split it per ticker.
//!
//! This crate holds every pipeline step:
//! - Configuration (defaults, TOML file, environment overrides)
//! - Dataset locator and the Kaggle fetcher behind the `DatasetFetcher` seam
//! - Output directory preparation and source cleanup
//! - Partitioning into one Parquet file per ticker (single-pass or chunked)
//! - Progress callbacks and profiling scopes

pub mod config;
pub mod dataset;
pub mod error;
pub mod kaggle;
pub mod output;
pub mod partition;
pub mod pipeline;
pub mod profiling;
pub mod progress;

pub use config::{Compression, PartitionStrategy, PipelineConfig};
pub use dataset::{locate, DatasetFetcher, DatasetHandle, LocatedSource};
pub use error::PipelineError;
pub use kaggle::{KaggleCredentials, KaggleFetcher};
pub use output::{cleanup_source, count_parquet_files, prepare_output_dir};
pub use partition::{partition, PartitionOptions, PartitionSummary};
pub use pipeline::{run_pipeline, PipelineReport, RunOptions};
pub use progress::{NoProgress, PipelineProgress, ProgressSnapshot, ProgressUnit};
