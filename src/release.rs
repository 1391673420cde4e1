//! Release metadata shared by release sources, the updater and the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one published release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// Bare dotted version, without any leading `v` (e.g. `"1.4.2"`).
    pub version: String,
    /// When the release was published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    /// Release notes as published by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<ReleaseNotes>,
    /// Human-readable release title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    /// Artifact location advertised by the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl ReleaseInfo {
    /// Release with only a version set.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            release_date: None,
            release_notes: None,
            release_name: None,
            download_url: None,
        }
    }
}

/// Release notes: either one text blob or per-version entries (newest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReleaseNotes {
    /// Markdown or plain text.
    Text(String),
    /// Notes for each version between the installed one and the latest.
    Entries(Vec<ReleaseNoteEntry>),
}

/// Notes for a single version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseNoteEntry {
    /// Version the note belongs to.
    pub version: String,
    /// Note body.
    #[serde(default)]
    pub note: Option<String>,
}

impl std::fmt::Display for ReleaseNotes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Entries(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", entry.version)?;
                    if let Some(note) = &entry.note {
                        write!(f, ": {note}")?;
                    }
                }
                Ok(())
            }
        }
    }
}
