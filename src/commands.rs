//! UI-facing update actions.
//!
//! [`UpdateService`] bundles the updater, the settings store and the
//! background scheduler behind the actions a UI exposes. Every action
//! resolves to a structured response; failures become `success: false`
//! rather than errors.

use crate::config::UpdaterConfig;
use crate::error::Result;
use crate::release::ReleaseInfo;
use crate::scheduler::{BackgroundScheduler, SchedulerStatus};
use crate::settings::{AutoCheckSettings, SettingsPatch, SettingsStore};
use crate::update::Updater;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// Result of [`UpdateService::check_for_updates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub success: bool,
    /// The newer release, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_info: Option<ReleaseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the answer came from the development-mode short circuit.
    pub dev_mode: bool,
}

/// Result of [`UpdateService::download_update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of actions without a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    fn from_result<E: std::fmt::Display>(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// The update actions a UI can invoke.
pub struct UpdateService {
    updater: Updater,
    store: Arc<dyn SettingsStore>,
    scheduler: Mutex<BackgroundScheduler>,
}

impl UpdateService {
    /// Service with a scheduler using the default initial delay.
    pub fn new(updater: Updater, store: Arc<dyn SettingsStore>) -> Self {
        let scheduler = BackgroundScheduler::new(
            Arc::new(updater.clone()),
            Arc::clone(&store),
            updater.is_packaged(),
        );
        Self::with_scheduler(updater, store, scheduler)
    }

    /// Service whose scheduler honours `config.scheduler`.
    pub fn from_config(
        updater: Updater,
        store: Arc<dyn SettingsStore>,
        config: &UpdaterConfig,
    ) -> Self {
        let scheduler = BackgroundScheduler::new(
            Arc::new(updater.clone()),
            Arc::clone(&store),
            updater.is_packaged(),
        )
        .with_initial_delay(Duration::from_secs(config.scheduler.initial_delay_secs));
        Self::with_scheduler(updater, store, scheduler)
    }

    /// Service around a preconfigured scheduler.
    pub fn with_scheduler(
        updater: Updater,
        store: Arc<dyn SettingsStore>,
        scheduler: BackgroundScheduler,
    ) -> Self {
        Self {
            updater,
            store,
            scheduler: Mutex::new(scheduler),
        }
    }

    /// The underlying updater.
    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    /// Arm background checks according to the stored settings.
    pub fn start_background_checks(&self) -> SchedulerStatus {
        self.scheduler().start()
    }

    /// Disarm background checks.
    pub fn stop_background_checks(&self) {
        self.scheduler().stop();
    }

    pub async fn check_for_updates(&self) -> CheckResponse {
        let dev_mode = !self.updater.is_packaged();
        match self.updater.check().await {
            Ok(update_info) => CheckResponse {
                success: true,
                update_info,
                error: None,
                dev_mode,
            },
            Err(e) => CheckResponse {
                success: false,
                update_info: None,
                error: Some(e.to_string()),
                dev_mode,
            },
        }
    }

    pub async fn download_update(&self) -> DownloadResponse {
        match self.updater.download().await {
            Ok(artifact) => DownloadResponse {
                success: true,
                artifact_path: Some(artifact.path),
                error: None,
            },
            Err(e) => DownloadResponse {
                success: false,
                artifact_path: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn install_update(&self) -> ActionResponse {
        ActionResponse::from_result(self.updater.install().await)
    }

    pub fn cancel_download(&self) -> ActionResponse {
        ActionResponse::from_result(self.updater.cancel_download())
    }

    pub fn get_app_version(&self) -> String {
        self.updater.current_version().to_owned()
    }

    pub fn open_release_page(&self) -> ActionResponse {
        ActionResponse::from_result(self.updater.open_release_page())
    }

    pub fn get_auto_update_settings(&self) -> AutoCheckSettings {
        AutoCheckSettings::load(self.store.as_ref())
    }

    /// Persist `patch` and re-arm background checks with the new settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the patch is invalid or cannot be persisted; the
    /// scheduler is left untouched in that case.
    pub fn set_auto_update_settings(&self, patch: SettingsPatch) -> Result<AutoCheckSettings> {
        let settings = AutoCheckSettings::apply(self.store.as_ref(), patch)?;
        info!(
            "auto-check settings now enabled={} interval={}h",
            settings.enabled, settings.interval_hours
        );
        self.scheduler().restart();
        Ok(settings)
    }

    fn scheduler(&self) -> MutexGuard<'_, BackgroundScheduler> {
        self.scheduler.lock().unwrap_or_else(|e| e.into_inner())
    }
}
