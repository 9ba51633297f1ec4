//! Dataset locator and the fetcher seam.
//!
//! The `DatasetFetcher` trait abstracts over the remote dataset host so the
//! locator can be exercised with a mock; `KaggleFetcher` is the real one.

use crate::error::Result;
use crate::profiling::ProfileScope;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// `owner/name` plus a version number, as used by the dataset host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    pub owner: String,
    pub name: String,
    pub version: u32,
}

impl DatasetHandle {
    pub fn new(owner: &str, name: &str, version: u32) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version,
        }
    }

    /// Expected local path of `file` inside a cache root:
    /// `{cache_root}/datasets/{owner}/{name}/versions/{version}/{file}`
    pub fn local_path(&self, cache_root: &Path, file: &str) -> PathBuf {
        cache_root
            .join("datasets")
            .join(&self.owner)
            .join(&self.name)
            .join("versions")
            .join(self.version.to_string())
            .join(file)
    }
}

impl fmt::Display for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@v{}", self.owner, self.name, self.version)
    }
}

/// Downloads a single file of a dataset into a cache root.
pub trait DatasetFetcher {
    /// Human-readable name of the remote host.
    fn name(&self) -> &str;

    /// Fetch `file` from `handle`, storing it under `cache_root`.
    ///
    /// Returns the local path of the fetched file.
    fn fetch(&self, handle: &DatasetHandle, file: &str, cache_root: &Path) -> Result<PathBuf>;
}

/// A resolved source file and whether this run had to download it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedSource {
    pub path: PathBuf,
    pub fetched: bool,
}

/// Resolve the source file, fetching it only when it is not already cached.
pub fn locate(
    handle: &DatasetHandle,
    file: &str,
    cache_root: &Path,
    fetcher: &dyn DatasetFetcher,
) -> Result<LocatedSource> {
    let _scope = ProfileScope::new("locate");

    let expected = handle.local_path(cache_root, file);
    if expected.exists() {
        info!(path = %expected.display(), "source dataset already cached");
        return Ok(LocatedSource {
            path: expected,
            fetched: false,
        });
    }

    info!(dataset = %handle, file, via = fetcher.name(), "source dataset not cached, fetching");
    let path = fetcher.fetch(handle, file, cache_root)?;
    Ok(LocatedSource {
        path,
        fetched: true,
    })
}
