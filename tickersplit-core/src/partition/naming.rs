//! Ticker → output file name.
//!
//! Tickers are used verbatim except for characters that cannot appear in a
//! single path component: `/`, `\`, NUL and ASCII control characters become
//! `_`, and the special names `""`, `.` and `..` get a `_` prefix. Distinct
//! tickers that map to the same name are rejected rather than merged.

use crate::error::{PipelineError, Result};
use std::collections::HashMap;

pub fn sanitize_ticker(ticker: &str) -> String {
    let cleaned: String = ticker
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_ascii_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

/// `<sanitized ticker>.parquet`
pub fn ticker_file_name(ticker: &str) -> String {
    format!("{}.parquet", sanitize_ticker(ticker))
}

/// Hands out file names for one run and detects collisions.
#[derive(Debug, Default)]
pub struct FileNames {
    owners: HashMap<String, String>,
}

impl FileNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// File name for `ticker`; the same ticker always gets the same name.
    pub fn assign(&mut self, ticker: &str) -> Result<String> {
        let file_name = ticker_file_name(ticker);
        match self.owners.get(&file_name) {
            Some(owner) if owner != ticker => Err(PipelineError::FileNameCollision {
                first: owner.clone(),
                second: ticker.to_string(),
                file_name,
            }),
            Some(_) => Ok(file_name),
            None => {
                self.owners.insert(file_name.clone(), ticker.to_string());
                Ok(file_name)
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.owners.len()
    }
}
