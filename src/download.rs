//! Artifact downloader.
//!
//! Streams a release artifact to disk with progress callbacks. Redirects are
//! followed by hand (the HTTP client is built with redirects disabled) so the
//! hop count is bounded and only the terminal response reports progress.

use crate::error::DownloadError;
use crate::progress::{ProgressCallback, ProgressTracker};
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::LOCATION;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Default cap on followed redirects.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Connect timeout for artifact requests. There is no overall timeout since
/// installers can be large; cancellation covers stalled transfers.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Streams artifacts from HTTP(S) URLs to local files.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    max_redirects: usize,
}

impl Downloader {
    /// Build a downloader with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(user_agent: &str, max_redirects: usize) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| DownloadError::Network(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_redirects,
        })
    }

    /// Maximum number of redirects followed before failing.
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Download `url` to `dest`, invoking `on_progress` for every chunk.
    ///
    /// Returns the number of bytes written. On any failure (HTTP status,
    /// redirect limit, stream or disk error, cancellation) the file at `dest`
    /// is removed; removal failures are ignored. The same holds when the
    /// returned future is dropped before completion.
    ///
    /// # Errors
    ///
    /// See [`DownloadError`] for the failure kinds.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let partial = PartialFile { path: dest };
        let bytes = self.download_to(url, dest, on_progress, cancel).await?;
        partial.keep();
        info!("downloaded {bytes} bytes to {}", dest.display());
        Ok(bytes)
    }

    async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let started = Instant::now();
        let response = self.resolve(url, cancel).await?;
        let total = response.content_length().unwrap_or(0);

        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // The handle is dropped before `PartialFile` removes a partial file.
        let mut file = tokio::fs::File::create(dest).await?;
        let mut tracker = ProgressTracker::new(total, started);
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DownloadError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    file.write_all(&chunk).await?;
                    on_progress(tracker.record(chunk.len()));
                }
                Some(Err(e)) => {
                    return Err(DownloadError::Io(std::io::Error::other(format!(
                        "body stream failed: {e}"
                    ))));
                }
                None => break,
            }
        }

        file.flush().await?;
        drop(file);

        let received = tracker.transferred();
        if total > 0 && received != total {
            return Err(DownloadError::Truncated {
                expected: total,
                received,
            });
        }
        Ok(received)
    }

    /// Issue the request, following redirects until a terminal response.
    async fn resolve(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut current =
            Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{url}: {e}")))?;
        let mut hops = 0usize;

        loop {
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DownloadError::Cancelled),
                sent = self.client.get(current.clone()).send() => sent
                    .map_err(|e| DownloadError::Network(e.to_string()))?,
            };

            let status = response.status();
            if is_followed_redirect(status) {
                if hops >= self.max_redirects {
                    warn!("giving up on {url} after {hops} redirects");
                    return Err(DownloadError::RedirectLoop { hops });
                }
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(DownloadError::MissingLocation)?;
                let next = current
                    .join(location)
                    .map_err(|e| DownloadError::InvalidUrl(format!("{location}: {e}")))?;
                hops += 1;
                debug!("redirect {hops} ({status}): {current} -> {next}");
                current = next;
                continue;
            }

            if status != StatusCode::OK {
                return Err(DownloadError::HttpStatus(status.as_u16()));
            }
            return Ok(response);
        }
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Removes the destination on drop unless [`keep`](Self::keep) was called,
/// covering error returns and abandoned futures alike.
struct PartialFile<'a> {
    path: &'a Path,
}

impl PartialFile<'_> {
    fn keep(self) {
        std::mem::forget(self);
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        match std::fs::remove_file(self.path) {
            Ok(()) => debug!("removed partial download {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("cannot remove partial download {}: {e}", self.path.display()),
        }
    }
}

/// Pick a local file name for an artifact URL.
///
/// Uses the last non-empty path segment of the URL, falling back to
/// `fallback` when the URL has none (e.g. `https://host/`).
pub fn artifact_file_name(url: &str, fallback: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| fallback.to_owned())
}
