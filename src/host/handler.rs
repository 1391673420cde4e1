//! Routes bridge commands to the [`UpdateService`].

use crate::commands::UpdateService;
use crate::host::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use crate::settings::SettingsPatch;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Dispatches [`CommandEnvelope`]s to update actions.
#[derive(Clone)]
pub struct UpdateCommandHandler {
    service: Arc<UpdateService>,
}

impl UpdateCommandHandler {
    pub fn new(service: Arc<UpdateService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &UpdateService {
        &self.service
    }

    /// Run one command and build its response.
    ///
    /// Action failures are reported inside the payload (`success: false`);
    /// an `ok: false` envelope means the command itself was malformed.
    pub async fn route(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        let request_id = envelope.request_id.as_str();
        if let Err(e) = envelope.validate() {
            return ResponseEnvelope::error(request_id, e.to_string());
        }
        debug!(command = envelope.command.as_str(), request_id, "routing command");

        let service = self.service.as_ref();
        let payload = match envelope.command {
            CommandName::UpdateCheck => to_payload(&service.check_for_updates().await),
            CommandName::UpdateDownload => to_payload(&service.download_update().await),
            CommandName::UpdateInstall => to_payload(&service.install_update().await),
            CommandName::UpdateCancel => to_payload(&service.cancel_download()),
            CommandName::AppVersion => Ok(serde_json::json!({
                "version": service.get_app_version(),
            })),
            CommandName::ReleasePageOpen => to_payload(&service.open_release_page()),
            CommandName::SettingsGet => to_payload(&service.get_auto_update_settings()),
            CommandName::SettingsSet => {
                let patch = match parse_patch(&envelope.payload) {
                    Ok(patch) => patch,
                    Err(message) => return ResponseEnvelope::error(request_id, message),
                };
                match service.set_auto_update_settings(patch) {
                    Ok(settings) => to_payload(&settings),
                    Err(e) => return ResponseEnvelope::error(request_id, e.to_string()),
                }
            }
            CommandName::HostStop => Ok(serde_json::json!({ "stopping": true })),
        };

        match payload {
            Ok(payload) => ResponseEnvelope::ok(request_id, payload),
            Err(e) => ResponseEnvelope::error(request_id, format!("cannot encode response: {e}")),
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(value)
}

fn parse_patch(payload: &serde_json::Value) -> Result<SettingsPatch, String> {
    if payload.is_null() {
        return Ok(SettingsPatch::default());
    }
    serde_json::from_value(payload.clone()).map_err(|e| format!("invalid settings patch: {e}"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::FetchError;
    use crate::release::ReleaseInfo;
    use crate::settings::MemoryStore;
    use crate::source::ReleaseSource;
    use crate::update::Updater;
    use async_trait::async_trait;
    use serde_json::json;

    struct UpToDate;

    #[async_trait]
    impl ReleaseSource for UpToDate {
        fn name(&self) -> &str {
            "up-to-date"
        }

        async fn fetch_latest(&self) -> Result<ReleaseInfo, FetchError> {
            Ok(ReleaseInfo::new("1.0.0"))
        }
    }

    fn handler() -> UpdateCommandHandler {
        let updater = Updater::builder("1.0.0", Arc::new(UpToDate))
            .installer(Arc::new(crate::update::DiskImageInstaller::new(
                "{version}",
                Arc::new(crate::update::SystemLauncher),
                Arc::new(crate::update::ProcessExit),
            )))
            .build()
            .unwrap();
        let service = UpdateService::new(updater, Arc::new(MemoryStore::new()));
        UpdateCommandHandler::new(Arc::new(service))
    }

    #[tokio::test]
    async fn check_command_returns_check_response() {
        let response = handler()
            .route(&CommandEnvelope::new("r1", CommandName::UpdateCheck, json!({})))
            .await;
        assert!(response.ok);
        assert_eq!(response.request_id, "r1");
        assert_eq!(response.payload["success"], true);
        assert_eq!(response.payload["devMode"], false);
        assert!(response.payload.get("updateInfo").is_none());
    }

    #[tokio::test]
    async fn app_version_command() {
        let response = handler()
            .route(&CommandEnvelope::new("r2", CommandName::AppVersion, json!(null)))
            .await;
        assert_eq!(response.payload, json!({"version": "1.0.0"}));
    }

    #[tokio::test]
    async fn settings_set_applies_patch() {
        let handler = handler();
        let response = handler
            .route(&CommandEnvelope::new(
                "r3",
                CommandName::SettingsSet,
                json!({"enabled": false, "intervalHours": 12}),
            ))
            .await;
        assert!(response.ok, "{:?}", response.error);
        assert_eq!(response.payload, json!({"enabled": false, "intervalHours": 12}));

        let response = handler
            .route(&CommandEnvelope::new("r4", CommandName::SettingsGet, json!({})))
            .await;
        assert_eq!(response.payload["intervalHours"], 12);
    }

    #[tokio::test]
    async fn settings_set_rejects_bad_payload() {
        let response = handler()
            .route(&CommandEnvelope::new(
                "r5",
                CommandName::SettingsSet,
                json!({"intervalHours": "soon"}),
            ))
            .await;
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("invalid settings patch"));
    }

    #[tokio::test]
    async fn invalid_envelope_is_rejected() {
        let mut envelope = CommandEnvelope::new("r6", CommandName::AppVersion, json!({}));
        envelope.v = 99;
        let response = handler().route(&envelope).await;
        assert!(!response.ok);
    }

    #[tokio::test]
    async fn download_failure_is_reported_in_payload() {
        let response = handler()
            .route(&CommandEnvelope::new("r7", CommandName::UpdateDownload, json!({})))
            .await;
        assert!(response.ok);
        assert_eq!(response.payload["success"], false);
    }
}
