//! Kaggle dataset fetcher.
//!
//! Downloads a single dataset file through the public v1 API and stores it in
//! the same layout kagglehub uses, so a cache populated by either tool is
//! reused. Large files may be served zipped; those are unpacked in place.

use crate::config::FetchConfig;
use crate::dataset::{DatasetFetcher, DatasetHandle};
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// API credentials, sent as HTTP basic auth.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

impl KaggleCredentials {
    /// `KAGGLE_USERNAME`/`KAGGLE_KEY`, else `~/.kaggle/kaggle.json`.
    pub fn discover() -> Option<Self> {
        let home_file = dirs::home_dir().map(|h| h.join(".kaggle").join("kaggle.json"));
        Self::resolve(|key| std::env::var(key).ok(), home_file.as_deref())
    }

    fn resolve<F>(lookup: F, file: Option<&Path>) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let (Some(username), Some(key)) = (lookup("KAGGLE_USERNAME"), lookup("KAGGLE_KEY")) {
            return Some(Self { username, key });
        }
        let content = fs::read_to_string(file?).ok()?;
        serde_json::from_str(&content).ok()
    }
}

pub struct KaggleFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
    credentials: Option<KaggleCredentials>,
}

impl KaggleFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("tickersplit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| PipelineError::Network {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: KaggleCredentials::discover(),
        })
    }

    pub fn with_credentials(mut self, credentials: Option<KaggleCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// `{base}/datasets/download/{owner}/{name}/{file}?datasetVersionNumber={version}`
    fn download_url(&self, handle: &DatasetHandle, file: &str) -> String {
        format!(
            "{}/datasets/download/{}/{}/{}?datasetVersionNumber={}",
            self.base_url, handle.owner, handle.name, file, handle.version
        )
    }

    /// Stream the response body into `tmp_path`.
    fn download_to(&self, url: &str, handle: &DatasetHandle, tmp_path: &Path) -> Result<()> {
        let mut request = self.client.get(url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.key));
        }

        let mut resp = request.send().map_err(|source| PipelineError::Network {
            url: url.to_string(),
            source,
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(PipelineError::Unauthorized(handle.to_string()));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PipelineError::DatasetNotFound(handle.to_string()));
        }
        if !status.is_success() {
            return Err(PipelineError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut out = fs::File::create(tmp_path).map_err(PipelineError::io(tmp_path))?;
        let bytes = resp.copy_to(&mut out).map_err(|source| PipelineError::Network {
            url: url.to_string(),
            source,
        })?;
        debug!(bytes, path = %tmp_path.display(), "download complete");
        Ok(())
    }
}

impl DatasetFetcher for KaggleFetcher {
    fn name(&self) -> &str {
        "kaggle"
    }

    fn fetch(&self, handle: &DatasetHandle, file: &str, cache_root: &Path) -> Result<PathBuf> {
        let target = handle.local_path(cache_root, file);
        let dir = target
            .parent()
            .ok_or_else(|| PipelineError::Config(format!("bad target path {}", target.display())))?;
        fs::create_dir_all(dir).map_err(PipelineError::io(dir))?;

        let tmp_path = with_suffix(&target, ".tmp");
        let url = self.download_url(handle, file);
        info!(%url, "downloading dataset file");

        if let Err(e) = self.download_to(&url, handle, &tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        let finished = if is_zip(&tmp_path)? && !file.ends_with(".zip") {
            let unpacked = extract_member(&tmp_path, file, &target);
            let _ = fs::remove_file(&tmp_path);
            unpacked
        } else {
            fs::rename(&tmp_path, &target).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                PipelineError::io(&target)(e)
            })
        };
        finished?;

        Ok(target)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn is_zip(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = fs::File::open(path).map_err(PipelineError::io(path))?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == ZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(PipelineError::io(path)(e)),
    }
}

/// Unpack `file` from the archive at `archive_path` to `target`.
///
/// Falls back to the only entry when the archive holds exactly one file
/// under a different name.
fn extract_member(archive_path: &Path, file: &str, target: &Path) -> Result<()> {
    let reader = fs::File::open(archive_path).map_err(PipelineError::io(archive_path))?;
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| PipelineError::Archive(e.to_string()))?;

    let index = match archive.index_for_name(file) {
        Some(i) => i,
        None if archive.len() == 1 => 0,
        None => {
            return Err(PipelineError::Archive(format!(
                "'{file}' not found among {} archive entries",
                archive.len()
            )))
        }
    };

    let mut entry = archive
        .by_index(index)
        .map_err(|e| PipelineError::Archive(e.to_string()))?;
    let tmp_target = with_suffix(target, ".unzip");
    let mut out = fs::File::create(&tmp_target).map_err(PipelineError::io(&tmp_target))?;
    if let Err(e) = io::copy(&mut entry, &mut out) {
        let _ = fs::remove_file(&tmp_target);
        return Err(PipelineError::io(&tmp_target)(e));
    }
    drop(out);
    fs::rename(&tmp_target, target).map_err(PipelineError::io(target))?;
    info!(entry = entry.name(), path = %target.display(), "unpacked zipped download");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn download_url_includes_version() {
        let fetcher = KaggleFetcher::new(&FetchConfig {
            base_url: "https://example.test/api/v1/".into(),
            timeout_secs: 5,
        })
        .unwrap()
        .with_credentials(None);
        let handle = DatasetHandle::new("jakewright", "stocks", 2);
        assert_eq!(
            fetcher.download_url(&handle, "all.parquet"),
            "https://example.test/api/v1/datasets/download/jakewright/stocks/all.parquet?datasetVersionNumber=2"
        );
    }

    #[test]
    fn credentials_prefer_env_over_file() {
        let dir = temp_dir();
        let file = dir.path().join("kaggle.json");
        fs::write(&file, r#"{"username":"file_user","key":"file_key"}"#).unwrap();

        let from_env = KaggleCredentials::resolve(
            |k| match k {
                "KAGGLE_USERNAME" => Some("env_user".into()),
                "KAGGLE_KEY" => Some("env_key".into()),
                _ => None,
            },
            Some(&file),
        )
        .unwrap();
        assert_eq!(from_env.username, "env_user");

        let from_file = KaggleCredentials::resolve(|_| None, Some(&file)).unwrap();
        assert_eq!(from_file.username, "file_user");
        assert_eq!(from_file.key, "file_key");
    }

    #[test]
    fn credentials_absent_without_env_or_file() {
        let dir = temp_dir();
        let missing = dir.path().join("nope.json");
        assert!(KaggleCredentials::resolve(|_| None, Some(&missing)).is_none());
        assert!(KaggleCredentials::resolve(|_| None, None).is_none());
    }

    #[test]
    fn zip_detection() {
        let dir = temp_dir();
        let plain = dir.path().join("plain.parquet");
        fs::write(&plain, b"PAR1....PAR1").unwrap();
        assert!(!is_zip(&plain).unwrap());

        let tiny = dir.path().join("tiny");
        fs::write(&tiny, b"PK").unwrap();
        assert!(!is_zip(&tiny).unwrap());

        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("all.parquet", b"PAR1")]);
        assert!(is_zip(&archive).unwrap());
    }

    #[test]
    fn extract_named_member() {
        let dir = temp_dir();
        let archive = dir.path().join("download.tmp");
        write_zip(
            &archive,
            &[("readme.txt", b"hello"), ("all.parquet", b"PAR1data")],
        );

        let target = dir.path().join("all.parquet");
        extract_member(&archive, "all.parquet", &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"PAR1data");
    }

    #[test]
    fn extract_single_member_under_other_name() {
        let dir = temp_dir();
        let archive = dir.path().join("download.tmp");
        write_zip(&archive, &[("renamed.parquet", b"PAR1x")]);

        let target = dir.path().join("all.parquet");
        extract_member(&archive, "all.parquet", &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"PAR1x");
    }

    #[test]
    fn extract_missing_member_is_an_archive_error() {
        let dir = temp_dir();
        let archive = dir.path().join("download.tmp");
        write_zip(&archive, &[("a.csv", b"1"), ("b.csv", b"2")]);

        let err = extract_member(&archive, "all.parquet", &dir.path().join("all.parquet"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Archive(_)));
    }
}
