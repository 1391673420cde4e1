//! Restart prompt shown after an interactive download.

use crate::update::state::DownloadedArtifact;
use async_trait::async_trait;

/// The user's answer to the restart prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartChoice {
    /// Install the update now.
    RestartNow,
    /// Keep running; the artifact stays downloaded.
    Later,
}

/// Asks the user whether to restart into a downloaded update.
#[async_trait]
pub trait RestartPrompt: Send + Sync {
    async fn ask(&self, artifact: &DownloadedArtifact) -> RestartChoice;
}

/// Prompt that always defers. Used when no UI is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferRestart;

#[async_trait]
impl RestartPrompt for DeferRestart {
    async fn ask(&self, _artifact: &DownloadedArtifact) -> RestartChoice {
        RestartChoice::Later
    }
}
