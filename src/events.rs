//! Outbound update events.
//!
//! Events flow one way, from the updater to whatever renders them. They are
//! delivered on an unbounded channel so the updater never waits on the UI.

use crate::progress::DownloadProgress;
use crate::release::{ReleaseInfo, ReleaseNotes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::trace;

/// Lifecycle events emitted by the updater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum UpdateEvent {
    /// A release check started.
    CheckingForUpdate,

    /// A newer release exists.
    #[serde(rename_all = "camelCase")]
    UpdateAvailable {
        version: String,
        release_date: Option<DateTime<Utc>>,
        release_notes: Option<ReleaseNotes>,
        release_name: Option<String>,
    },

    /// The running version is current.
    #[serde(rename_all = "camelCase")]
    UpdateNotAvailable {
        /// The running version.
        version: String,
        /// Set when the answer came from the development-mode short circuit.
        dev_mode: bool,
    },

    /// An artifact chunk arrived.
    DownloadProgress(DownloadProgress),

    /// The artifact is on disk and ready to install.
    #[serde(rename_all = "camelCase")]
    UpdateDownloaded {
        version: String,
        release_notes: Option<ReleaseNotes>,
        release_name: Option<String>,
        artifact_path: PathBuf,
    },

    /// A check, download or install failed.
    UpdateError {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },

    /// A background check found a newer release.
    #[serde(rename_all = "camelCase")]
    UpdateAvailableSilent {
        version: String,
        release_date: Option<DateTime<Utc>>,
    },
}

impl UpdateEvent {
    /// Wire name of the event (e.g. `"update-available"`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckingForUpdate => "checking-for-update",
            Self::UpdateAvailable { .. } => "update-available",
            Self::UpdateNotAvailable { .. } => "update-not-available",
            Self::DownloadProgress(_) => "download-progress",
            Self::UpdateDownloaded { .. } => "update-downloaded",
            Self::UpdateError { .. } => "update-error",
            Self::UpdateAvailableSilent { .. } => "update-available-silent",
        }
    }

    /// Payload as a JSON value (`null` for events without one).
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("payload").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }

    pub(crate) fn available(release: &ReleaseInfo) -> Self {
        Self::UpdateAvailable {
            version: release.version.clone(),
            release_date: release.release_date,
            release_notes: release.release_notes.clone(),
            release_name: release.release_name.clone(),
        }
    }

    pub(crate) fn available_silent(release: &ReleaseInfo) -> Self {
        Self::UpdateAvailableSilent {
            version: release.version.clone(),
            release_date: release.release_date,
        }
    }

    pub(crate) fn error(err: &crate::UpdateError) -> Self {
        Self::UpdateError {
            message: err.to_string(),
            stack: err.cause_chain(),
        }
    }
}

/// Sending half of the event channel.
///
/// Cloning is cheap. Emitting never blocks and silently drops events once
/// the receiver is gone.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<UpdateEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver the UI should drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UpdateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards every event.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Emit an event.
    pub fn emit(&self, event: UpdateEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        trace!("emitting {}", event.name());
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn unit_event_serializes_without_payload() {
        let value = serde_json::to_value(UpdateEvent::CheckingForUpdate).unwrap();
        assert_eq!(value, json!({"event": "checking-for-update"}));
        assert_eq!(UpdateEvent::CheckingForUpdate.payload(), serde_json::Value::Null);
    }

    #[test]
    fn not_available_uses_camel_case_fields() {
        let event = UpdateEvent::UpdateNotAvailable {
            version: "1.0.0".to_owned(),
            dev_mode: true,
        };
        assert_eq!(event.name(), "update-not-available");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "update-not-available", "payload": {"version": "1.0.0", "devMode": true}})
        );
    }

    #[test]
    fn progress_payload_is_flat() {
        let event = UpdateEvent::DownloadProgress(DownloadProgress {
            percent: 50.0,
            bytes_per_second: 1000.0,
            transferred: 512,
            total: 1024,
        });
        let payload = event.payload();
        assert_eq!(payload["transferred"], 512);
        assert_eq!(payload["bytesPerSecond"], 1000.0);
    }

    #[test]
    fn error_event_omits_missing_stack() {
        let err = crate::UpdateError::Config("boom".to_owned());
        let value = serde_json::to_value(UpdateEvent::error(&err)).unwrap();
        assert_eq!(value["payload"]["message"], "config error: boom");
        assert!(value["payload"].get("stack").is_none());
    }

    #[test]
    fn event_names_match_serde_tags() {
        let events = [
            UpdateEvent::CheckingForUpdate,
            UpdateEvent::available(&ReleaseInfo::new("2.0.0")),
            UpdateEvent::available_silent(&ReleaseInfo::new("2.0.0")),
            UpdateEvent::UpdateError {
                message: "x".to_owned(),
                stack: None,
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["event"], event.name());
        }
    }

    #[test]
    fn sink_delivers_and_tolerates_closed_receiver() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(UpdateEvent::CheckingForUpdate);
        assert_eq!(rx.try_recv().unwrap(), UpdateEvent::CheckingForUpdate);

        drop(rx);
        sink.emit(UpdateEvent::CheckingForUpdate);
        EventSink::disconnected().emit(UpdateEvent::CheckingForUpdate);
    }
}
