//! # Fetcher
//!
//! Performs the transfer of one candidate URL into a scratch file
//! under a timeout class. The fetcher itself never retries; fallback
//! across candidates is the acquirer's job, and placement under the
//! final cache name is the cache store's.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::{IMAGE_FETCH_TIMEOUT, MEDIUM_VIDEO_FETCH_TIMEOUT, VIDEO_FETCH_TIMEOUT};
use crate::error::AcquireError;
use crate::probe::{content_type_of, looks_like_json_error, media_content_type_ok, size_from_headers};
use crate::types::MediaKind;

/// Transfer timeout classes, selected by the caller per item kind and
/// caching cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Images are small; fail fast.
    Image,
    /// Forced-cache or below-threshold video.
    MediumVideo,
    /// Large video download into the cache.
    Video,
}

impl TimeoutClass {
    pub fn duration(self) -> Duration {
        match self {
            TimeoutClass::Image => IMAGE_FETCH_TIMEOUT,
            TimeoutClass::MediumVideo => MEDIUM_VIDEO_FETCH_TIMEOUT,
            TimeoutClass::Video => VIDEO_FETCH_TIMEOUT,
        }
    }
}

/// A completed transfer, still at its scratch location.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub scratch: PathBuf,
    pub bytes_written: u64,
    pub content_type: Option<String>,
}

/// Transfer seam; the retry layer depends on this trait so its policy
/// is testable without a network.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Transfer `url` into `scratch`. One attempt; any failure is
    /// reported, never retried here. The scratch file is removed on
    /// failure.
    async fn fetch(
        &self,
        url: &str,
        scratch: &Path,
        headers: &HeaderMap,
        kind: MediaKind,
        timeout: TimeoutClass,
    ) -> Result<FetchedFile, AcquireError>;
}

#[async_trait]
impl<T: Transfer + ?Sized> Transfer for std::sync::Arc<T> {
    async fn fetch(
        &self,
        url: &str,
        scratch: &Path,
        headers: &HeaderMap,
        kind: MediaKind,
        timeout: TimeoutClass,
    ) -> Result<FetchedFile, AcquireError> {
        (**self).fetch(url, scratch, headers, kind, timeout).await
    }
}

/// HTTP implementation of [`Transfer`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_inner(
        &self,
        url: &str,
        scratch: &Path,
        headers: &HeaderMap,
        kind: MediaKind,
        timeout: TimeoutClass,
    ) -> Result<FetchedFile, AcquireError> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout.duration())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(AcquireError::AccessDenied(url.to_string()));
        }
        if !status.is_success() {
            return Err(AcquireError::StatusCode(status));
        }

        let content_type = content_type_of(response.headers());
        if let Some(content_type) = &content_type {
            if !media_content_type_ok(content_type, kind) {
                return Err(AcquireError::InvalidContent(format!(
                    "unexpected content type {content_type} for {url}"
                )));
            }
        }
        let declared = size_from_headers(response.headers());

        if let Some(parent) = scratch.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(scratch).await?;
        let mut bytes_written: u64 = 0;
        let mut first_chunk = true;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            // With no Content-Type to go by, reject disguised JSON
            // error payloads before committing any bytes.
            if first_chunk && content_type.is_none() && looks_like_json_error(&chunk) {
                return Err(AcquireError::InvalidContent(format!(
                    "JSON error payload from {url}"
                )));
            }
            first_chunk = false;
            file.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(
            url = url,
            bytes = bytes_written,
            declared = ?declared,
            "fetched media to scratch"
        );
        Ok(FetchedFile {
            scratch: scratch.to_path_buf(),
            bytes_written,
            content_type,
        })
    }
}

#[async_trait]
impl Transfer for Fetcher {
    async fn fetch(
        &self,
        url: &str,
        scratch: &Path,
        headers: &HeaderMap,
        kind: MediaKind,
        timeout: TimeoutClass,
    ) -> Result<FetchedFile, AcquireError> {
        match self.fetch_inner(url, scratch, headers, kind, timeout).await {
            Ok(fetched) => Ok(fetched),
            Err(e) => {
                warn!(url = url, error = %e, "media fetch failed");
                // Never leave a partial scratch file behind.
                let _ = fs::remove_file(scratch).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classes_are_ordered() {
        assert!(TimeoutClass::Image.duration() < TimeoutClass::MediumVideo.duration());
        assert!(TimeoutClass::MediumVideo.duration() < TimeoutClass::Video.duration());
    }
}
