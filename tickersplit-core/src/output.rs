//! Output directory preparation, re-listing, and source cleanup.

use crate::error::{PipelineError, Result};
use crate::profiling::ProfileScope;
use std::fs;
use std::path::Path;
use tracing::info;

/// Remove `dir` and everything under it, then recreate it (with parents).
///
/// Prior outputs are always discarded; there is no merge mode.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    let _scope = ProfileScope::new("prepare_output_dir");

    if dir.exists() {
        info!(path = %dir.display(), "removing previous output");
        if dir.is_dir() {
            fs::remove_dir_all(dir).map_err(PipelineError::io(dir))?;
        } else {
            fs::remove_file(dir).map_err(PipelineError::io(dir))?;
        }
    }
    fs::create_dir_all(dir).map_err(PipelineError::io(dir))?;
    Ok(())
}

/// Number of `*.parquet` files directly inside `dir`.
pub fn count_parquet_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir).map_err(PipelineError::io(dir))? {
        let entry = entry.map_err(PipelineError::io(dir))?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("parquet") {
            count += 1;
        }
    }
    Ok(count)
}

/// Delete the source file when `enabled`. Returns whether a file was removed.
pub fn cleanup_source(source: &Path, enabled: bool) -> Result<bool> {
    let _scope = ProfileScope::new("cleanup");

    if !enabled || !source.exists() {
        return Ok(false);
    }
    fs::remove_file(source).map_err(PipelineError::io(source))?;
    info!(path = %source.display(), "removed source dataset");
    Ok(true)
}
