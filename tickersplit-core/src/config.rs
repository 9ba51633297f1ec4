//! Pipeline configuration.
//!
//! Load order: built-in defaults, then an optional TOML file, then the
//! `KAGGLEHUB_CACHE` environment override for the data root. Every field has
//! a default so an empty file (or no file at all) is a valid configuration.

use crate::dataset::DatasetHandle;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Environment variable that relocates the data/cache root.
pub const CACHE_ENV_VAR: &str = "KAGGLEHUB_CACHE";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TICKERSPLIT_CONFIG";

/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "tickersplit.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cache root; fetched datasets land under `{data_dir}/datasets/`.
    pub data_dir: PathBuf,
    /// Output directory name under `data_dir`.
    pub output_subdir: String,
    pub ticker_column: String,
    pub dataset: DatasetConfig,
    pub partition: PartitionConfig,
    pub fetch: FetchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_subdir: "ticker-data".into(),
            ticker_column: "Ticker".into(),
            dataset: DatasetConfig::default(),
            partition: PartitionConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub owner: String,
    pub name: String,
    pub version: u32,
    pub file: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            owner: "jakewright".into(),
            name: "9000-tickers-of-stock-market-data-full-history".into(),
            version: 2,
            file: "all_stock_data.parquet".into(),
        }
    }
}

/// How the source table is read and split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Load the whole table, then write each ticker group in one call.
    #[default]
    SinglePass,
    /// Read fixed-size row slices and append to per-ticker writers.
    Chunked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Snappy,
    Zstd,
    Lz4,
    Uncompressed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PartitionConfig {
    pub strategy: PartitionStrategy,
    pub chunk_rows: usize,
    pub compression: Compression,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            strategy: PartitionStrategy::SinglePass,
            chunk_rows: 1_000_000,
            compression: Compression::Snappy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.kaggle.com/api/v1".into(),
            timeout_secs: 600,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(PipelineError::io(path))?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(format!("parse TOML: {e}")))
    }

    /// Resolve the effective configuration for a run.
    ///
    /// `explicit` wins over `TICKERSPLIT_CONFIG`, which wins over
    /// `./tickersplit.toml`. A missing default file is not an error; a
    /// missing explicit one is.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(CACHE_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.partition.chunk_rows == 0 {
            return Err(PipelineError::Config("partition.chunk_rows must be > 0".into()));
        }
        if self.ticker_column.trim().is_empty() {
            return Err(PipelineError::Config("ticker_column must not be empty".into()));
        }
        if self.output_subdir.trim().is_empty() {
            return Err(PipelineError::Config("output_subdir must not be empty".into()));
        }
        // The output dir is wiped on every run, so it must stay strictly inside data_dir.
        let mut components = Path::new(&self.output_subdir).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(PipelineError::Config(format!(
                "output_subdir must be a single directory name, got '{}'",
                self.output_subdir
            )));
        }
        let d = &self.dataset;
        if d.owner.is_empty() || d.name.is_empty() || d.file.is_empty() {
            return Err(PipelineError::Config(
                "dataset owner, name and file must all be set".into(),
            ));
        }
        Ok(())
    }

    pub fn dataset_handle(&self) -> DatasetHandle {
        DatasetHandle::new(&self.dataset.owner, &self.dataset.name, self.dataset.version)
    }

    /// Where the partitioned files go: `{data_dir}/{output_subdir}`.
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join(&self.output_subdir)
    }
}
