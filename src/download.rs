//! PDF download.
//!
//! [`HttpDownloader`] performs a single attempt; retries and per-attempt
//! deadlines are applied by the caller through [`crate::retry::RetryPolicy`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;

use crate::config::{DownloadConfig, SourceConfig};
use crate::error::{IngestError, Result};

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the body at `url` to `dest`. `dest` only appears once complete.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(source: &SourceConfig, download: &DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(source.user_agent.clone())
            .timeout(download.attempt_timeout())
            .connect_timeout(Duration::from_secs(source.timeout_secs))
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

/// `<dest>.part`, next to the destination so the final rename stays on one filesystem.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// 429 and 5xx are worth retrying; every other failure status is final.
pub fn classify_status(status: StatusCode, url: &str) -> IngestError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        IngestError::Retryable(format!("HTTP {status} for {url}"))
    } else {
        IngestError::Fatal(format!("HTTP {status} for {url}"))
    }
}

fn classify_transport(err: reqwest::Error, url: &str) -> IngestError {
    if err.is_builder() {
        IngestError::Fatal(format!("invalid request for {url}: {err}"))
    } else {
        IngestError::Retryable(format!("request to {url} failed: {err}"))
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, url));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let written =
            persist_stream(response.bytes_stream(), dest, |e| classify_transport(e, url)).await?;
        tracing::debug!(url, dest = %dest.display(), bytes = written, "download complete");
        Ok(())
    }
}

/// Write `stream` to `<dest>.part` and rename it into place.
///
/// On any error the `.part` file is removed and `dest` is left untouched.
pub async fn persist_stream<S, B, E>(
    stream: S,
    dest: &Path,
    map_err: impl Fn(E) -> IngestError,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
{
    let tmp_path = part_path(dest);
    let outcome = write_part(stream, &tmp_path, map_err).await;
    match outcome {
        Ok(written) => match tokio::fs::rename(&tmp_path, dest).await {
            Ok(()) => Ok(written),
            Err(e) => {
                remove_partial(dest).await;
                Err(e.into())
            }
        },
        Err(e) => {
            remove_partial(dest).await;
            Err(e)
        }
    }
}

async fn write_part<S, B, E>(
    stream: S,
    tmp_path: &Path,
    map_err: impl Fn(E) -> IngestError,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut file = tokio::fs::File::create(tmp_path).await?;
    let mut written: u64 = 0;

    futures::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(&map_err)?;
        file.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Remove a leftover `<dest>.part`, e.g. after an attempt was cancelled by a timeout.
pub async fn remove_partial(dest: &Path) {
    let tmp_path = part_path(dest);
    match tokio::fs::remove_file(&tmp_path).await {
        Ok(()) => tracing::debug!(path = %tmp_path.display(), "removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %tmp_path.display(),
            error = %e,
            "failed to remove partial download"
        ),
    }
}
