//! Scheduled check definitions.
//!
//! The scheduler only knows how to run a [`SilentChecker`]; the updater
//! implements it. Each run produces a [`SilentCheckOutcome`].

use crate::update::UpdatePhase;
use async_trait::async_trait;

/// Something that can run a background update check.
#[async_trait]
pub trait SilentChecker: Send + Sync {
    async fn silent_check(&self) -> SilentCheckOutcome;
}

/// Outcome of one background check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SilentCheckOutcome {
    /// A newer release was found and announced.
    UpdateAvailable(String),
    /// The running version is current.
    UpToDate,
    /// The newer release is already downloaded; nothing was announced.
    AlreadyDownloaded(String),
    /// Another operation owned the updater.
    Busy(UpdatePhase),
    /// Development build; no check was made.
    Unpackaged,
    /// The check failed. Only logged.
    Failed(String),
}

impl SilentCheckOutcome {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        match self {
            Self::UpdateAvailable(v) => format!("update {v} available"),
            Self::UpToDate => "up to date".to_owned(),
            Self::AlreadyDownloaded(v) => format!("update {v} already downloaded"),
            Self::Busy(phase) => format!("skipped while {phase}"),
            Self::Unpackaged => "skipped in development mode".to_owned(),
            Self::Failed(e) => format!("check failed: {e}"),
        }
    }

    /// Whether the check reached the release source.
    pub fn ran(&self) -> bool {
        !matches!(self, Self::Busy(_) | Self::Unpackaged)
    }
}

/// Which timer triggered a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The deferred check after the first start.
    Initial,
    /// The recurring interval.
    Periodic,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Periodic => write!(f, "periodic"),
        }
    }
}
