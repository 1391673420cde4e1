//! Versioned command/event envelopes for the host bridge.

use serde::{Deserialize, Serialize};

/// Contract version for bridge envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Commands accepted over the host bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "update.check")]
    UpdateCheck,
    #[serde(rename = "update.download")]
    UpdateDownload,
    #[serde(rename = "update.install")]
    UpdateInstall,
    #[serde(rename = "update.cancel")]
    UpdateCancel,
    #[serde(rename = "app.version")]
    AppVersion,
    #[serde(rename = "release_page.open")]
    ReleasePageOpen,
    #[serde(rename = "settings.get")]
    SettingsGet,
    #[serde(rename = "settings.set")]
    SettingsSet,
    #[serde(rename = "host.stop")]
    HostStop,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpdateCheck => "update.check",
            Self::UpdateDownload => "update.download",
            Self::UpdateInstall => "update.install",
            Self::UpdateCancel => "update.cancel",
            Self::AppVersion => "app.version",
            Self::ReleasePageOpen => "release_page.open",
            Self::SettingsGet => "settings.get",
            Self::SettingsSet => "settings.set",
            Self::HostStop => "host.stop",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "update.check" => Some(Self::UpdateCheck),
            "update.download" => Some(Self::UpdateDownload),
            "update.install" => Some(Self::UpdateInstall),
            "update.cancel" => Some(Self::UpdateCancel),
            "app.version" => Some(Self::AppVersion),
            "release_page.open" => Some(Self::ReleasePageOpen),
            "settings.get" => Some(Self::SettingsGet),
            "settings.set" => Some(Self::SettingsSet),
            "host.stop" => Some(Self::HostStop),
            _ => None,
        }
    }

    /// Commands that may run for a long time and must not block the reader.
    #[must_use]
    pub fn is_long_running(self) -> bool {
        matches!(
            self,
            Self::UpdateCheck | Self::UpdateDownload | Self::UpdateInstall
        )
    }
}

/// A versioned response envelope from bridge -> UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from UI -> bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from bridge -> UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

impl From<&crate::events::UpdateEvent> for EventEnvelope {
    fn from(event: &crate::events::UpdateEvent) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            event.name(),
            event.payload(),
        )
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
