//! Auto-check settings and the key-value store they live in.
//!
//! The store is an external collaborator: the host application may already
//! own a preferences file. [`JsonFileStore`] persists a flat JSON object (by
//! default `~/.config/updraft/update-settings.json`) for hosts that do not.

use crate::error::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Store key for [`AutoCheckSettings::enabled`].
pub const KEY_AUTO_CHECK: &str = "autoCheckUpdate";

/// Store key for [`AutoCheckSettings::interval_hours`].
pub const KEY_CHECK_INTERVAL: &str = "autoCheckInterval";

/// Default hours between background checks.
pub const DEFAULT_INTERVAL_HOURS: u32 = 24;

/// Scalar key-value storage for settings.
pub trait SettingsStore: Send + Sync {
    /// Read a value, `None` if unset.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be persisted.
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Background check preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCheckSettings {
    /// Whether background checks run at all.
    pub enabled: bool,
    /// Hours between background checks (at least 1).
    pub interval_hours: u32,
}

impl Default for AutoCheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: DEFAULT_INTERVAL_HOURS,
        }
    }
}

/// Partial update for [`AutoCheckSettings`]; `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub interval_hours: Option<u32>,
}

impl AutoCheckSettings {
    /// Read settings from `store`, using defaults for missing or malformed
    /// values. Intervals below one hour are raised to one hour.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        let enabled = store
            .get(KEY_AUTO_CHECK)
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.enabled);
        let interval_hours = store
            .get(KEY_CHECK_INTERVAL)
            .and_then(|v| v.as_u64())
            .map(|h| u32::try_from(h).unwrap_or(u32::MAX))
            .unwrap_or(defaults.interval_hours)
            .max(1);
        Self {
            enabled,
            interval_hours,
        }
    }

    /// Apply `patch` on top of the stored settings and persist the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects a write or the interval is zero.
    pub fn apply(store: &dyn SettingsStore, patch: SettingsPatch) -> Result<Self> {
        if patch.interval_hours == Some(0) {
            return Err(UpdateError::Settings(
                "interval must be at least one hour".to_owned(),
            ));
        }
        let mut settings = Self::load(store);
        if let Some(enabled) = patch.enabled {
            store.set(KEY_AUTO_CHECK, Value::Bool(enabled))?;
            settings.enabled = enabled;
        }
        if let Some(hours) = patch.interval_hours {
            store.set(KEY_CHECK_INTERVAL, Value::from(hours))?;
            settings.interval_hours = hours;
        }
        Ok(settings)
    }

    /// Interval as a [`Duration`](std::time::Duration).
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.interval_hours.max(1)) * 3600)
    }
}

/// In-memory store, for tests and hosts that persist settings themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_owned(), value);
        Ok(())
    }
}

/// Store persisted as a flat JSON object on disk.
///
/// The file is read once at open and rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or unreadable file yields an
    /// empty store (a warning is logged for unreadable files).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!("ignoring unreadable settings file {}: {e}", path.display());
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UpdateError::Settings(format!(
                    "cannot create settings directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(values)
            .map_err(|e| UpdateError::Settings(format!("cannot serialize settings: {e}")))?;

        std::fs::write(&self.path, json).map_err(|e| {
            UpdateError::Settings(format!(
                "cannot write settings to {}: {e}",
                self.path.display()
            ))
        })
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_owned(), value);
        self.save(&values)
    }
}
