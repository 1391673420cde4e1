//! Platform-specific update installation.
//!
//! Two strategies exist and one is chosen at startup:
//!
//! - [`InPlaceInstaller`]: the artifact is the new executable. It replaces
//!   the running binary (rename to backup, copy in, clear quarantine) and the
//!   process relaunches itself. On Windows a helper `.bat` script finishes
//!   the swap after the process exits.
//! - [`DiskImageInstaller`]: the artifact is a disk image. It is handed to
//!   the OS default handler, and after a short delay (so the mount dialog
//!   can render) the application quits.

use crate::error::{DownloadError, InstallError};
use crate::release::ReleaseInfo;
use crate::update::state::DownloadedArtifact;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Delay between opening a disk image and quitting.
pub const DISK_IMAGE_SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Which install mechanism this platform uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    /// Replace the running executable and relaunch.
    InPlace,
    /// Open a disk image and quit.
    DiskImage,
}

impl InstallKind {
    /// The install kind for the platform this binary was built for.
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::DiskImage
        } else {
            Self::InPlace
        }
    }

    /// Release asset name suffix matching this platform
    /// (e.g. `-arm64.dmg`, `-linux-x64`).
    pub fn artifact_suffix(self) -> Option<String> {
        match self {
            Self::DiskImage => Some(format!("-{}.dmg", arch())),
            Self::InPlace => {
                let exe = if cfg!(target_os = "windows") { ".exe" } else { "" };
                Some(format!("-{}-{}{exe}", std::env::consts::OS, arch()))
            }
        }
    }
}

/// Architecture label used in release asset names.
pub fn arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Substitute `{version}` and `{arch}` in an artifact URL template.
pub fn expand_template(template: &str, version: &str) -> String {
    template
        .replace("{version}", version)
        .replace("{arch}", arch())
}

/// Opens files and URLs with the OS default handler.
pub trait Launcher: Send + Sync {
    /// Open `target` (a path or URL).
    ///
    /// # Errors
    ///
    /// Returns an error if no handler could be started.
    fn open(&self, target: &str) -> Result<(), InstallError>;
}

/// Application-level lifecycle control.
pub trait AppLifecycle: Send + Sync {
    /// Ask the application to quit.
    fn quit(&self);
}

/// Swaps in a new executable and restarts into it.
pub trait Relauncher: Send + Sync {
    /// Install `artifact` over the running executable and relaunch.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement fails. The running binary is
    /// restored from its backup when possible.
    fn relaunch(&self, artifact: &Path) -> Result<(), InstallError>;
}

/// A platform install mechanism.
#[async_trait]
pub trait InstallStrategy: Send + Sync {
    /// Which mechanism this is.
    fn kind(&self) -> InstallKind;

    /// Artifact URL to download for `release`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] when no artifact location is
    /// known for the release.
    fn artifact_url(&self, release: &ReleaseInfo) -> Result<String, DownloadError>;

    /// Hand the downloaded artifact to the platform.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::PlatformHandlerFailed`] if the platform
    /// mechanism fails.
    async fn install(&self, artifact: &DownloadedArtifact) -> Result<(), InstallError>;
}

/// [`Launcher`] backed by the `open` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn open(&self, target: &str) -> Result<(), InstallError> {
        open::that(target)
            .map_err(|e| InstallError::PlatformHandlerFailed(format!("cannot open {target}: {e}")))
    }
}

/// [`AppLifecycle`] that exits the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl AppLifecycle for ProcessExit {
    fn quit(&self) {
        info!("exiting to complete update");
        std::process::exit(0);
    }
}

/// Replaces the executable at `target` and relaunches it.
pub struct SelfReplaceRelauncher {
    target: PathBuf,
    lifecycle: Arc<dyn AppLifecycle>,
}

impl SelfReplaceRelauncher {
    /// Relauncher for an explicit executable path.
    pub fn new(target: impl Into<PathBuf>, lifecycle: Arc<dyn AppLifecycle>) -> Self {
        Self {
            target: target.into(),
            lifecycle,
        }
    }

    /// Relauncher for the currently running executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable path cannot be determined.
    pub fn for_current_exe(lifecycle: Arc<dyn AppLifecycle>) -> Result<Self, InstallError> {
        let target = std::env::current_exe().map_err(|e| {
            InstallError::PlatformHandlerFailed(format!(
                "cannot determine current executable path: {e}"
            ))
        })?;
        Ok(Self::new(target, lifecycle))
    }
}

impl Relauncher for SelfReplaceRelauncher {
    fn relaunch(&self, artifact: &Path) -> Result<(), InstallError> {
        #[cfg(not(target_os = "windows"))]
        {
            replace_binary_unix(artifact, &self.target)?;
            std::process::Command::new(&self.target)
                .args(std::env::args_os().skip(1))
                .spawn()
                .map_err(|e| {
                    InstallError::PlatformHandlerFailed(format!(
                        "cannot relaunch {}: {e}",
                        self.target.display()
                    ))
                })?;
        }
        #[cfg(target_os = "windows")]
        {
            let script = write_windows_helper(artifact, &self.target)?;
            std::process::Command::new("cmd")
                .arg("/C")
                .arg(&script)
                .spawn()
                .map_err(|e| {
                    InstallError::PlatformHandlerFailed(format!(
                        "cannot start update script {}: {e}",
                        script.display()
                    ))
                })?;
        }
        self.lifecycle.quit();
        Ok(())
    }
}

/// Install strategy that swaps the executable in place.
pub struct InPlaceInstaller {
    relauncher: Arc<dyn Relauncher>,
}

impl InPlaceInstaller {
    pub fn new(relauncher: Arc<dyn Relauncher>) -> Self {
        Self { relauncher }
    }
}

#[async_trait]
impl InstallStrategy for InPlaceInstaller {
    fn kind(&self) -> InstallKind {
        InstallKind::InPlace
    }

    fn artifact_url(&self, release: &ReleaseInfo) -> Result<String, DownloadError> {
        release.download_url.clone().ok_or_else(|| {
            DownloadError::InvalidUrl(format!(
                "release {} does not name an artifact",
                release.version
            ))
        })
    }

    async fn install(&self, artifact: &DownloadedArtifact) -> Result<(), InstallError> {
        info!("installing {} in place", artifact.version);
        let relauncher = Arc::clone(&self.relauncher);
        let path = artifact.path.clone();
        tokio::task::spawn_blocking(move || relauncher.relaunch(&path))
            .await
            .map_err(|e| InstallError::PlatformHandlerFailed(format!("install task failed: {e}")))?
    }
}

/// Install strategy that opens a disk image and quits.
pub struct DiskImageInstaller {
    url_template: String,
    launcher: Arc<dyn Launcher>,
    lifecycle: Arc<dyn AppLifecycle>,
    settle_delay: Duration,
}

impl DiskImageInstaller {
    /// Installer downloading from `url_template` (see [`expand_template`]).
    pub fn new(
        url_template: impl Into<String>,
        launcher: Arc<dyn Launcher>,
        lifecycle: Arc<dyn AppLifecycle>,
    ) -> Self {
        Self {
            url_template: url_template.into(),
            launcher,
            lifecycle,
            settle_delay: DISK_IMAGE_SETTLE_DELAY,
        }
    }
}

#[async_trait]
impl InstallStrategy for DiskImageInstaller {
    fn kind(&self) -> InstallKind {
        InstallKind::DiskImage
    }

    fn artifact_url(&self, release: &ReleaseInfo) -> Result<String, DownloadError> {
        Ok(expand_template(&self.url_template, &release.version))
    }

    async fn install(&self, artifact: &DownloadedArtifact) -> Result<(), InstallError> {
        info!("opening disk image {}", artifact.path.display());
        self.launcher.open(&artifact.path.to_string_lossy())?;
        tokio::time::sleep(self.settle_delay).await;
        self.lifecycle.quit();
        Ok(())
    }
}

/// Create the install strategy for `kind`.
///
/// # Errors
///
/// Returns an error if the running executable cannot be located for an
/// in-place install.
pub fn create_installer(
    kind: InstallKind,
    url_template: &str,
    launcher: Arc<dyn Launcher>,
    lifecycle: Arc<dyn AppLifecycle>,
) -> Result<Arc<dyn InstallStrategy>, InstallError> {
    let installer: Arc<dyn InstallStrategy> = match kind {
        InstallKind::DiskImage => {
            Arc::new(DiskImageInstaller::new(url_template, launcher, lifecycle))
        }
        InstallKind::InPlace => Arc::new(InPlaceInstaller::new(Arc::new(
            SelfReplaceRelauncher::for_current_exe(lifecycle)?,
        ))),
    };
    Ok(installer)
}

/// Set executable permission on Unix platforms.
#[cfg(not(target_os = "windows"))]
fn set_executable(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        InstallError::PlatformHandlerFailed(format!(
            "cannot set executable permission on {}: {e}",
            path.display()
        ))
    })
}

/// Rename the old binary to a backup, copy the new one in, then drop both
/// the backup and the downloaded artifact.
#[cfg(not(target_os = "windows"))]
fn replace_binary_unix(new_binary: &Path, current_binary: &Path) -> Result<(), InstallError> {
    let backup = current_binary.with_extension("old");

    if current_binary.exists() {
        std::fs::rename(current_binary, &backup).map_err(|e| {
            InstallError::PlatformHandlerFailed(format!(
                "cannot back up {} to {}: {e}",
                current_binary.display(),
                backup.display()
            ))
        })?;
    }

    if let Err(e) = std::fs::copy(new_binary, current_binary) {
        if backup.exists()
            && let Err(restore) = std::fs::rename(&backup, current_binary)
        {
            warn!(
                "cannot restore {} from backup {}: {restore}",
                current_binary.display(),
                backup.display()
            );
        }
        return Err(InstallError::PlatformHandlerFailed(format!(
            "cannot install new binary to {}: {e}",
            current_binary.display()
        )));
    }

    set_executable(current_binary)?;

    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("xattr")
            .args(["-c", &current_binary.to_string_lossy()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
    }

    if let Err(e) = std::fs::remove_file(&backup)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("cannot remove backup {}: {e}", backup.display());
    }
    if let Err(e) = std::fs::remove_file(new_binary)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("cannot remove installed artifact {}: {e}", new_binary.display());
    }

    info!("binary updated at {}", current_binary.display());
    Ok(())
}

/// Write a helper script that waits for exit, swaps the binary and relaunches.
#[cfg(target_os = "windows")]
fn write_windows_helper(new_binary: &Path, current_binary: &Path) -> Result<PathBuf, InstallError> {
    let script_path = std::env::temp_dir().join("updraft-update.bat");
    let script = format!(
        r#"@echo off
timeout /t 2 /nobreak >nul
copy /y "{new}" "{current}" >nul
if errorlevel 1 (
    exit /b 1
)
del "{new}" >nul 2>&1
start "" "{current}"
del "%~f0"
"#,
        new = new_binary.display(),
        current = current_binary.display()
    );

    std::fs::write(&script_path, script).map_err(|e| {
        InstallError::PlatformHandlerFailed(format!(
            "cannot write update script to {}: {e}",
            script_path.display()
        ))
    })?;

    info!("update script written to {}", script_path.display());
    Ok(script_path)
}
