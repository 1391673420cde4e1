//! Configuration types for the update orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level updater configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// The application being updated.
    pub app: AppConfig,
    /// Where release metadata comes from.
    pub source: SourceConfig,
    /// Artifact download settings.
    pub download: DownloadConfig,
    /// Background check scheduling.
    pub scheduler: SchedulerConfig,
    /// Path of the persisted auto-check settings (None = next to the config).
    pub settings_path: Option<PathBuf>,
}

/// Identity and packaging of the running application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name, used for file names and the User-Agent.
    pub name: String,
    /// Version currently running.
    pub current_version: String,
    /// Whether this is a packaged release build.
    ///
    /// Unpackaged (development) builds never download or install updates and
    /// never arm background checks.
    pub packaged: bool,
    /// Human-facing releases page, opened as a fallback in development mode.
    pub release_page_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "updraft".to_owned(),
            current_version: env!("CARGO_PKG_VERSION").to_owned(),
            packaged: true,
            release_page_url: "https://github.com/saorsa-labs/updraft/releases".to_owned(),
        }
    }
}

/// Which release source implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Managed update feed (JSON manifest with ETag caching).
    #[default]
    Feed,
    /// Public GitHub releases API.
    Github,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feed => write!(f, "feed"),
            Self::Github => write!(f, "github"),
        }
    }
}

/// Release source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Which source to query.
    pub kind: SourceKind,
    /// Manifest URL for [`SourceKind::Feed`].
    pub feed_url: String,
    /// `releases/latest` endpoint for [`SourceKind::Github`].
    pub github_api_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            feed_url: "https://updates.example.com/updraft/latest.json".to_owned(),
            github_api_url: "https://api.github.com/repos/saorsa-labs/updraft/releases/latest"
                .to_owned(),
            timeout_secs: 15,
        }
    }
}

/// Artifact download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory downloaded artifacts are written to (None = platform cache).
    pub dir: Option<PathBuf>,
    /// Artifact URL template for disk-image installs.
    ///
    /// `{version}` and `{arch}` are substituted before downloading.
    pub artifact_url_template: String,
    /// Maximum redirects followed per download.
    pub max_redirects: usize,
    /// User-Agent header (None = `<app name>/<version>`).
    pub user_agent: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: None,
            artifact_url_template:
                "https://github.com/saorsa-labs/updraft/releases/download/v{version}/Updraft-{version}-{arch}.dmg"
                    .to_owned(),
            max_redirects: crate::download::DEFAULT_MAX_REDIRECTS,
            user_agent: None,
        }
    }
}

/// Background scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay before the one-shot initial check, in seconds.
    pub initial_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 10,
        }
    }
}

impl UpdaterConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::UpdateError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/updraft/config.toml`.
    pub fn default_config_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Path of the persisted auto-check settings.
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| config_dir().join("update-settings.json"))
    }

    /// Directory downloaded artifacts are written to.
    pub fn download_dir(&self) -> PathBuf {
        self.download.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(&self.app.name)
                .join("updates")
        })
    }

    /// User-Agent sent with every request.
    pub fn user_agent(&self) -> String {
        self.download
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.app.name, self.app.current_version))
    }

    /// Validate values the updater relies on.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`](crate::error::UpdateError::Config)
    /// naming the first invalid field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.app.current_version.trim().is_empty() {
            return Err(crate::error::UpdateError::Config(
                "app.current_version must not be empty".to_owned(),
            ));
        }
        if self.source.timeout_secs == 0 {
            return Err(crate::error::UpdateError::Config(
                "source.timeout_secs must be at least 1".to_owned(),
            ));
        }
        let url = match self.source.kind {
            SourceKind::Feed => &self.source.feed_url,
            SourceKind::Github => &self.source.github_api_url,
        };
        url::Url::parse(url).map_err(|e| {
            crate::error::UpdateError::Config(format!(
                "invalid {} source URL {url}: {e}",
                self.source.kind
            ))
        })?;
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(config).join("updraft")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config").join("updraft")
    } else {
        PathBuf::from("/tmp/updraft-config")
    }
}
