//! Public release index client (GitHub releases API).
//!
//! Queries `releases/latest`, strips the `v` prefix from the tag and maps
//! the response onto [`ReleaseInfo`]. The whole request, body included, is
//! bounded by a timeout; when it elapses the in-flight future is dropped,
//! which aborts the request.

use crate::error::FetchError;
use crate::release::{ReleaseInfo, ReleaseNotes};
use crate::source::{ReleaseSource, bare_version, map_transport_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for the release index request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

/// Release source backed by the GitHub releases API.
pub struct GithubReleaseSource {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
    asset_suffix: Option<String>,
}

impl GithubReleaseSource {
    /// Create a client for a `releases/latest` endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: &str, user_agent: &str, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| crate::UpdateError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.to_owned(),
            timeout,
            asset_suffix: None,
        })
    }

    /// Use the first asset whose name ends with `suffix` as the download URL.
    pub fn with_asset_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.asset_suffix = Some(suffix.into());
        self
    }

    async fn request(&self) -> Result<ReleaseInfo, FetchError> {
        let response = self
            .client
            .get(&self.api_url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| map_transport_error(&e, self.timeout))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(FetchError::NoReleases),
            other => return Err(FetchError::ServiceError(other.as_u16())),
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(&e, self.timeout))?;
        let release: GithubRelease = serde_json::from_slice(&body)
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(self.release_from(release))
    }

    fn release_from(&self, release: GithubRelease) -> ReleaseInfo {
        let download_url = self.asset_suffix.as_deref().and_then(|suffix| {
            release
                .assets
                .iter()
                .find(|asset| asset.name.ends_with(suffix))
                .map(|asset| asset.browser_download_url.clone())
        });

        ReleaseInfo {
            version: bare_version(&release.tag_name).to_owned(),
            release_date: Some(release.published_at),
            release_notes: release
                .body
                .filter(|b| !b.trim().is_empty())
                .map(ReleaseNotes::Text),
            release_name: release.name.filter(|n| !n.trim().is_empty()),
            download_url,
        }
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    fn name(&self) -> &str {
        "github"
    }

    async fn fetch_latest(&self) -> Result<ReleaseInfo, FetchError> {
        match tokio::time::timeout(self.timeout, self.request()).await {
            Ok(result) => {
                if let Ok(release) = &result {
                    debug!("release index reports version {}", release.version);
                }
                result
            }
            Err(_) => {
                warn!(
                    "release index request to {} aborted after {:?}",
                    self.api_url, self.timeout
                );
                Err(FetchError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}
