//! Update lifecycle phases and the transition guard.
//!
//! The guard is a pure function of the current phase and the requested
//! action. The [`Updater`](super::Updater) evaluates it while holding its
//! state lock, which makes the phase check and the phase change one atomic
//! step.

use crate::error::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the updater is in the update lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// A release check is in flight.
    Checking,
    /// A newer release is known but not downloaded.
    Available,
    /// The running version is the latest.
    NotAvailable,
    /// An artifact download is in flight.
    Downloading,
    /// An artifact is on disk, ready to install.
    Downloaded,
    /// The install strategy is running.
    Installing,
    /// The last check or download failed.
    Error,
}

impl UpdatePhase {
    /// Whether an operation currently owns the updater.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Checking | Self::Downloading | Self::Installing)
    }
}

impl std::fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Checking => write!(f, "checking"),
            Self::Available => write!(f, "available"),
            Self::NotAvailable => write!(f, "not available"),
            Self::Downloading => write!(f, "downloading"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Installing => write!(f, "installing"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A user or scheduler request against the updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Check,
    Download,
    Install,
    Cancel,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Check => write!(f, "check"),
            Self::Download => write!(f, "download"),
            Self::Install => write!(f, "install"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// A completed download tracked by the updater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedArtifact {
    /// Where the artifact was written.
    pub path: PathBuf,
    /// Release version the artifact belongs to.
    pub version: String,
}

/// Decide whether `action` may start from `phase`.
///
/// Anything racing an in-flight operation is [`UpdateError::Busy`]; any other
/// pairing missing from the lifecycle table is
/// [`UpdateError::InvalidTransition`].
pub(crate) fn admit(phase: UpdatePhase, action: Action) -> Result<()> {
    let allowed = match action {
        Action::Cancel => return guard_cancel(phase),
        _ if phase.is_in_flight() => return Err(UpdateError::Busy { phase }),
        Action::Check => true,
        Action::Download => matches!(phase, UpdatePhase::Available | UpdatePhase::Downloaded),
        Action::Install => phase == UpdatePhase::Downloaded,
    };
    if allowed {
        Ok(())
    } else {
        Err(UpdateError::InvalidTransition { action, phase })
    }
}

fn guard_cancel(phase: UpdatePhase) -> Result<()> {
    if phase == UpdatePhase::Downloading {
        Ok(())
    } else {
        Err(UpdateError::InvalidTransition {
            action: Action::Cancel,
            phase,
        })
    }
}
