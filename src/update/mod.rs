//! Update lifecycle.
//!
//! Checks a release source for newer versions, downloads the artifact and
//! hands it to a platform install strategy, emitting events along the way.

pub mod installer;
pub mod machine;
pub mod prompt;
pub mod state;

pub use installer::{
    AppLifecycle, DiskImageInstaller, InPlaceInstaller, InstallKind, InstallStrategy, Launcher,
    ProcessExit, Relauncher, SelfReplaceRelauncher, SystemLauncher,
};
pub use machine::{DEV_CHECK_DELAY, Updater, UpdaterBuilder};
pub use prompt::{DeferRestart, RestartChoice, RestartPrompt};
pub use state::{Action, DownloadedArtifact, UpdatePhase};
