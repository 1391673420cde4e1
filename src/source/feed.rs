//! Managed update feed client.
//!
//! The feed publishes a small JSON manifest describing the latest release.
//! The last manifest is cached together with its `ETag` so repeated checks
//! are conditional requests; a `304 Not Modified` answers from the cache.

use crate::error::FetchError;
use crate::release::{ReleaseInfo, ReleaseNotes};
use crate::source::{ReleaseSource, bare_version, map_transport_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Manifest as published by the feed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedManifest {
    version: String,
    #[serde(default)]
    release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    release_notes: Option<ReleaseNotes>,
    #[serde(default)]
    release_name: Option<String>,
    /// Absolute artifact URL.
    #[serde(default)]
    url: Option<String>,
    /// Artifact path relative to the manifest.
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedManifest {
    etag: String,
    release: ReleaseInfo,
}

/// Release source backed by a managed update feed.
pub struct FeedSource {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
    cache: Mutex<Option<CachedManifest>>,
}

impl FeedSource {
    /// Create a feed client for the manifest at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is invalid or the HTTP client cannot be built.
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> crate::Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| crate::UpdateError::Config(format!("invalid feed URL {url}: {e}")))?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| crate::UpdateError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url,
            timeout,
            cache: Mutex::new(None),
        })
    }

    /// ETag of the cached manifest, if any.
    pub fn cached_etag(&self) -> Option<String> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.etag.clone())
    }

    fn cached_release(&self) -> Option<ReleaseInfo> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.release.clone())
    }

    fn store(&self, etag: Option<String>, release: &ReleaseInfo) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = etag.map(|etag| CachedManifest {
            etag,
            release: release.clone(),
        });
    }

    fn release_from(&self, manifest: FeedManifest) -> Result<ReleaseInfo, FetchError> {
        let version = bare_version(&manifest.version).to_owned();
        if version.is_empty() {
            return Err(FetchError::InvalidResponse(
                "manifest has an empty version".to_owned(),
            ));
        }

        let artifact = manifest.url.or(manifest.path);
        let download_url = match artifact {
            Some(location) => Some(
                self.url
                    .join(&location)
                    .map_err(|e| {
                        FetchError::InvalidResponse(format!(
                            "bad artifact location {location}: {e}"
                        ))
                    })?
                    .to_string(),
            ),
            None => None,
        };

        Ok(ReleaseInfo {
            version,
            release_date: manifest.release_date,
            release_notes: manifest.release_notes,
            release_name: manifest.release_name,
            download_url,
        })
    }
}

#[async_trait]
impl ReleaseSource for FeedSource {
    fn name(&self) -> &str {
        "feed"
    }

    async fn fetch_latest(&self) -> Result<ReleaseInfo, FetchError> {
        let mut request = self.client.get(self.url.clone());
        if let Some(etag) = self.cached_etag() {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&e, self.timeout))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                debug!("feed manifest not modified, using cached release");
                self.cached_release().ok_or_else(|| {
                    FetchError::InvalidResponse("304 without a cached manifest".to_owned())
                })
            }
            StatusCode::NOT_FOUND => Err(FetchError::NoReleases),
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| map_transport_error(&e, self.timeout))?;
                let manifest: FeedManifest = serde_json::from_slice(&body)
                    .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
                let release = self.release_from(manifest)?;
                self.store(etag, &release);
                debug!("feed reports version {}", release.version);
                Ok(release)
            }
            other => Err(FetchError::ServiceError(other.as_u16())),
        }
    }
}
