// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::{DownloadError, FetchError};
use crate::http::{ByteStream, HttpClient};

/// Retry policy for resource fetches
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Total number of attempts per resource, including the first one
    pub max_attempts: u32,
    /// Pause between two attempts
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Fetches raw resources with a bounded number of retries
#[derive(Clone)]
pub struct ResourceFetcher<C> {
    client: C,
    options: FetchOptions,
}

impl<C: HttpClient> ResourceFetcher<C> {
    pub fn new(client: C) -> Self {
        Self::with_options(client, FetchOptions::default())
    }

    pub fn with_options(client: C, options: FetchOptions) -> Self {
        Self { client, options }
    }

    /// Fetch the whole body of `url`
    ///
    /// Network errors and non-200 responses are retried up to
    /// `max_attempts`; an unusable URL fails immediately.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        validate_url(url)?;

        let attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < attempts => {
                    warn!(%url, attempt, error = %e, "fetch attempt failed, retrying");
                    self.pause().await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts,
                        last: Box::new(e),
                    });
                }
            }
        }
    }

    /// Fetch `url` and decode the body as (lossy) UTF-8
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let body = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Stream `url` into `output_path`
    ///
    /// The body is written to a `.partial` sibling first and renamed once
    /// complete, so an interrupted download never leaves a truncated file
    /// under the final name. `on_progress` receives the bytes written so far
    /// and the expected total, if known.
    pub async fn download_to<F>(
        &self,
        url: &str,
        output_path: &Path,
        mut on_progress: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        validate_url(url)?;

        let attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.try_download(url, output_path, &mut on_progress).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(%url, attempt, error = %e, "download attempt failed, retrying");
                    self.pause().await;
                    attempt += 1;
                }
                Err(DownloadError::Fetch(e)) if e.is_transient() => {
                    return Err(DownloadError::Fetch(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts,
                        last: Box::new(e),
                    }));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        debug!(%url, "requesting");
        let response = self
            .client
            .get_bytes(url)
            .await
            .map_err(|e| FetchError::Transient {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if response.status != 200 {
            return Err(FetchError::Transient {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status),
            });
        }

        Ok(response.body)
    }

    async fn try_download<F>(
        &self,
        url: &str,
        output_path: &Path,
        on_progress: &mut F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let response = self
            .client
            .get_stream(url)
            .await
            .map_err(|e| FetchError::Transient {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if response.status != 200 {
            return Err(FetchError::Transient {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status),
            }
            .into());
        }

        let partial_path = partial_path(output_path);
        let result = stream_to_file(
            url,
            response.body,
            response.content_length,
            &partial_path,
            on_progress,
        )
        .await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&partial_path, output_path)
                    .await
                    .map_err(|e| DownloadError::FileWriteFailed {
                        path: output_path.to_path_buf(),
                        source: e,
                    })?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial_path).await;
                Err(e)
            }
        }
    }

    async fn pause(&self) {
        if !self.options.retry_delay.is_zero() {
            tokio::time::sleep(self.options.retry_delay).await;
        }
    }
}

async fn stream_to_file<F>(
    url: &str,
    mut stream: ByteStream,
    content_length: Option<u64>,
    path: &Path,
    on_progress: &mut F,
) -> Result<u64, DownloadError>
where
    F: FnMut(u64, Option<u64>) + Send,
{
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;
        on_progress(bytes_downloaded, content_length);
    }

    // Ensure all data is flushed to disk
    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}

/// Check that `url` is an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::Invalid {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::Invalid {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}
