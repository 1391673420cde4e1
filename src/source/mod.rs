//! Release sources.
//!
//! A [`ReleaseSource`] answers one question: what is the latest published
//! release? The updater only sees the trait, so the managed feed and the
//! public release index are interchangeable.

pub mod feed;
pub mod github;

pub use feed::FeedSource;
pub use github::GithubReleaseSource;

use crate::config::{SourceKind, UpdaterConfig};
use crate::error::{FetchError, Result};
use crate::release::ReleaseInfo;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Capability to fetch the latest release metadata.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Short name for logs (e.g. `"feed"`).
    fn name(&self) -> &str;

    /// Fetch metadata for the latest published release.
    async fn fetch_latest(&self) -> std::result::Result<ReleaseInfo, FetchError>;
}

/// Build the release source selected in `config`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn from_config(config: &UpdaterConfig) -> Result<Arc<dyn ReleaseSource>> {
    let timeout = Duration::from_secs(config.source.timeout_secs);
    let user_agent = config.user_agent();
    let source: Arc<dyn ReleaseSource> = match config.source.kind {
        SourceKind::Feed => Arc::new(FeedSource::new(
            &config.source.feed_url,
            &user_agent,
            timeout,
        )?),
        SourceKind::Github => {
            let mut source =
                GithubReleaseSource::new(&config.source.github_api_url, &user_agent, timeout)?;
            if let Some(suffix) = crate::update::InstallKind::detect().artifact_suffix() {
                source = source.with_asset_suffix(suffix);
            }
            Arc::new(source)
        }
    };
    Ok(source)
}

/// Strip a leading `v`/`V` from a release tag (`"v1.4.2"` -> `"1.4.2"`).
pub fn bare_version(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

pub(crate) fn map_transport_error(err: &reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            secs: timeout.as_secs(),
        }
    } else {
        FetchError::Network(err.to_string())
    }
}
