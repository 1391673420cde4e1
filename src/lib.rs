//! Updraft: self-update orchestration for desktop applications.
//!
//! Given a running application with a known version, the crate decides
//! whether a newer release exists, downloads the artifact with progress
//! reporting and hands it to a platform install strategy.
//!
//! # Architecture
//!
//! - **Release sources**: a managed JSON feed or the GitHub releases API,
//!   behind the [`source::ReleaseSource`] trait
//! - **Downloader**: redirect-following, cancellable streaming to disk
//! - **Updater**: the lifecycle state machine, emitting [`UpdateEvent`]s
//! - **Scheduler**: background silent checks driven by persisted settings
//! - **Service and host bridge**: UI actions, also reachable as
//!   newline-delimited JSON over stdin/stdout

pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod host;
pub mod progress;
pub mod release;
pub mod scheduler;
pub mod settings;
pub mod source;
pub mod update;
pub mod version;

pub use commands::UpdateService;
pub use config::UpdaterConfig;
pub use download::Downloader;
pub use error::{DownloadError, FetchError, InstallError, Result, UpdateError};
pub use events::{EventSink, UpdateEvent};
pub use progress::DownloadProgress;
pub use release::{ReleaseInfo, ReleaseNotes};
pub use scheduler::BackgroundScheduler;
pub use update::{UpdatePhase, Updater};
pub use version::is_newer;
