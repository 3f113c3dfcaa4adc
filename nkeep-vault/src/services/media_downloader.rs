//! Media download collaborator

use async_trait::async_trait;
use futures::StreamExt;
use nkeep_common::config::SyncConfig;
use nkeep_common::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Downloads one media URL to a local file
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Returns bytes written. `dest` must not be observable half-written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Streams media over HTTP into a temp file, then renames it into place
pub struct HttpMediaDownloader {
    http_client: reqwest::Client,
}

impl HttpMediaDownloader {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        // Videos need far longer than a detail request
        Self::new(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs.saturating_mul(10)),
        )
    }
}

#[async_trait]
impl MediaDownloader for HttpMediaDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::TransientFetch(format!("download {}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("media {}", url)));
        }
        if !status.is_success() {
            return Err(Error::TransientFetch(format!(
                "download {}: upstream returned {}",
                url, status
            )));
        }

        let file_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Validation(format!("invalid media path {}", dest.display())))?;
        let tmp = dest.with_file_name(format!(".{}.download", file_name));

        match write_stream(response, &tmp).await {
            Ok(written) => {
                tokio::fs::rename(&tmp, dest)
                    .await
                    .map_err(|e| Error::io_context("rename", tmp.display(), e))?;
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }
}

async fn write_stream(response: reqwest::Response, tmp: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(tmp)
        .await
        .map_err(|e| Error::io_context("create", tmp.display(), e))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| Error::TransientFetch(format!("download interrupted: {}", e)))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io_context("write", tmp.display(), e))?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| Error::io_context("flush", tmp.display(), e))?;
    file.sync_all()
        .await
        .map_err(|e| Error::io_context("sync", tmp.display(), e))?;
    Ok(written)
}
