//! The update lifecycle state machine.
//!
//! [`Updater`] owns the lifecycle phase, the latest known release and the
//! downloaded artifact. Every operation first passes the transition guard
//! under the state lock; the lock is released before any network or disk
//! work, so the phase itself is the single-flight guard.

use crate::config::UpdaterConfig;
use crate::download::{Downloader, artifact_file_name};
use crate::error::{DownloadError, InstallError, Result, UpdateError};
use crate::events::{EventSink, UpdateEvent};
use crate::progress::DownloadProgress;
use crate::release::ReleaseInfo;
use crate::scheduler::{SilentCheckOutcome, SilentChecker};
use crate::source::ReleaseSource;
use crate::update::installer::{
    AppLifecycle, InstallKind, InstallStrategy, Launcher, ProcessExit, SystemLauncher,
    create_installer,
};
use crate::update::prompt::{DeferRestart, RestartChoice, RestartPrompt};
use crate::update::state::{Action, DownloadedArtifact, UpdatePhase, admit};
use crate::version::is_newer;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a development-mode check pretends to run.
pub const DEV_CHECK_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct State {
    phase: UpdatePhase,
    latest: Option<ReleaseInfo>,
    artifact: Option<DownloadedArtifact>,
    cancel: Option<CancellationToken>,
}

struct Inner {
    current_version: String,
    packaged: bool,
    release_page_url: String,
    download_dir: PathBuf,
    source: Arc<dyn ReleaseSource>,
    downloader: Downloader,
    installer: Arc<dyn InstallStrategy>,
    launcher: Arc<dyn Launcher>,
    prompt: Arc<dyn RestartPrompt>,
    events: EventSink,
    state: Mutex<State>,
}

/// Handle to the update state machine. Clones share the same state.
#[derive(Clone)]
pub struct Updater {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("current_version", &self.inner.current_version)
            .field("packaged", &self.inner.packaged)
            .field("source", &self.inner.source.name())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Updater`].
pub struct UpdaterBuilder {
    current_version: String,
    source: Arc<dyn ReleaseSource>,
    packaged: bool,
    release_page_url: String,
    download_dir: PathBuf,
    artifact_url_template: String,
    user_agent: Option<String>,
    max_redirects: usize,
    downloader: Option<Downloader>,
    installer: Option<Arc<dyn InstallStrategy>>,
    launcher: Arc<dyn Launcher>,
    lifecycle: Arc<dyn AppLifecycle>,
    prompt: Arc<dyn RestartPrompt>,
    events: EventSink,
}

impl UpdaterBuilder {
    /// Start a builder for an application at `current_version`.
    pub fn new(current_version: impl Into<String>, source: Arc<dyn ReleaseSource>) -> Self {
        let defaults = UpdaterConfig::default();
        Self {
            current_version: current_version.into(),
            source,
            packaged: true,
            release_page_url: defaults.app.release_page_url.clone(),
            download_dir: defaults.download_dir(),
            artifact_url_template: defaults.download.artifact_url_template,
            user_agent: None,
            max_redirects: defaults.download.max_redirects,
            downloader: None,
            installer: None,
            launcher: Arc::new(SystemLauncher),
            lifecycle: Arc::new(ProcessExit),
            prompt: Arc::new(DeferRestart),
            events: EventSink::disconnected(),
        }
    }

    /// Whether this is a packaged build. Unpackaged builds run in
    /// development mode.
    pub fn packaged(mut self, packaged: bool) -> Self {
        self.packaged = packaged;
        self
    }

    pub fn release_page_url(mut self, url: impl Into<String>) -> Self {
        self.release_page_url = url.into();
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn artifact_url_template(mut self, template: impl Into<String>) -> Self {
        self.artifact_url_template = template.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Use a preconfigured downloader (overrides user agent and redirect cap).
    pub fn downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Use a specific install strategy instead of the detected one.
    pub fn installer(mut self, installer: Arc<dyn InstallStrategy>) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<dyn AppLifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn RestartPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Build the updater.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the default
    /// install strategy cannot locate the running executable.
    pub fn build(self) -> Result<Updater> {
        let downloader = match self.downloader {
            Some(d) => d,
            None => {
                let user_agent = self
                    .user_agent
                    .unwrap_or_else(|| format!("updraft/{}", self.current_version));
                Downloader::new(&user_agent, self.max_redirects)?
            }
        };
        let installer = match self.installer {
            Some(i) => i,
            None => create_installer(
                InstallKind::detect(),
                &self.artifact_url_template,
                Arc::clone(&self.launcher),
                Arc::clone(&self.lifecycle),
            )?,
        };

        Ok(Updater {
            inner: Arc::new(Inner {
                current_version: self.current_version,
                packaged: self.packaged,
                release_page_url: self.release_page_url,
                download_dir: self.download_dir,
                source: self.source,
                downloader,
                installer,
                launcher: self.launcher,
                prompt: self.prompt,
                events: self.events,
                state: Mutex::new(State::default()),
            }),
        })
    }
}

impl Updater {
    /// Start building an updater.
    pub fn builder(
        current_version: impl Into<String>,
        source: Arc<dyn ReleaseSource>,
    ) -> UpdaterBuilder {
        UpdaterBuilder::new(current_version, source)
    }

    /// Builder preloaded from `config` with the source it selects.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured release source cannot be built.
    pub fn builder_from_config(config: &UpdaterConfig) -> Result<UpdaterBuilder> {
        let source = crate::source::from_config(config)?;
        Ok(UpdaterBuilder::new(&config.app.current_version, source)
            .packaged(config.app.packaged)
            .release_page_url(&config.app.release_page_url)
            .download_dir(config.download_dir())
            .artifact_url_template(&config.download.artifact_url_template)
            .user_agent(config.user_agent())
            .max_redirects(config.download.max_redirects))
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> UpdatePhase {
        self.lock().phase
    }

    /// Latest release seen by a check, if any.
    pub fn latest_release(&self) -> Option<ReleaseInfo> {
        self.lock().latest.clone()
    }

    /// The downloaded artifact, if any.
    pub fn artifact(&self) -> Option<DownloadedArtifact> {
        self.lock().artifact.clone()
    }

    pub fn current_version(&self) -> &str {
        &self.inner.current_version
    }

    /// `false` in development mode.
    pub fn is_packaged(&self) -> bool {
        self.inner.packaged
    }

    pub fn release_page_url(&self) -> &str {
        &self.inner.release_page_url
    }

    /// Open the human-facing releases page.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler could be started.
    pub fn open_release_page(&self) -> std::result::Result<(), InstallError> {
        self.inner.launcher.open(&self.inner.release_page_url)
    }

    /// Ask the release source whether a newer version exists.
    ///
    /// Returns the release when one is newer than the running version.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Busy`] if another operation is in flight, or
    /// the fetch error (after emitting `update-error`).
    pub async fn check(&self) -> Result<Option<ReleaseInfo>> {
        let previous = self.begin(Action::Check, UpdatePhase::Checking)?;
        let pending = PendingPhase::new(self, previous);

        if !self.inner.packaged {
            tokio::time::sleep(DEV_CHECK_DELAY).await;
            pending.settle();
            self.lock().phase = UpdatePhase::NotAvailable;
            debug!("development mode, skipping release check");
            self.inner.events.emit(UpdateEvent::UpdateNotAvailable {
                version: self.inner.current_version.clone(),
                dev_mode: true,
            });
            return Ok(None);
        }

        info!(
            "checking {} for updates (running {})",
            self.inner.source.name(),
            self.inner.current_version
        );
        self.inner.events.emit(UpdateEvent::CheckingForUpdate);

        let fetched = self.inner.source.fetch_latest().await;
        pending.settle();
        let release = match fetched {
            Ok(release) => release,
            Err(e) => return Err(self.fail(UpdatePhase::Error, e.into())),
        };

        let newer = is_newer(&release.version, &self.inner.current_version);
        {
            let mut state = self.lock();
            state.phase = if newer {
                UpdatePhase::Available
            } else {
                UpdatePhase::NotAvailable
            };
            state.latest = Some(release.clone());
        }

        if newer {
            info!("update available: {}", release.version);
            self.inner.events.emit(UpdateEvent::available(&release));
            Ok(Some(release))
        } else {
            info!("{} is up to date", self.inner.current_version);
            self.inner.events.emit(UpdateEvent::UpdateNotAvailable {
                version: self.inner.current_version.clone(),
                dev_mode: false,
            });
            Ok(None)
        }
    }

    /// Download the artifact for the latest available release.
    ///
    /// If that release is already downloaded, the tracked artifact is
    /// returned without a new transfer. After a fresh download the restart
    /// prompt is asked in the background.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Busy`] or [`UpdateError::InvalidTransition`]
    /// when not allowed from the current phase, the download error (after
    /// emitting `update-error`), or `DownloadError::Cancelled` when
    /// [`cancel_download`](Self::cancel_download) was called.
    pub async fn download(&self) -> Result<DownloadedArtifact> {
        if !self.inner.packaged {
            if let Err(e) = self.open_release_page() {
                warn!("cannot open release page: {e}");
            }
            return Err(InstallError::NotAvailableInMode.into());
        }

        let (release, cancel, previous) = {
            let mut state = self.lock();
            admit(state.phase, Action::Download)?;
            let Some(release) = state.latest.clone() else {
                return Err(UpdateError::InvalidTransition {
                    action: Action::Download,
                    phase: state.phase,
                });
            };
            let reusable = state
                .artifact
                .as_ref()
                .filter(|a| a.version == release.version && a.path.exists())
                .cloned();
            if let Some(existing) = reusable {
                debug!("{} already downloaded", release.version);
                state.phase = UpdatePhase::Downloaded;
                return Ok(existing);
            }
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            let previous = std::mem::replace(&mut state.phase, UpdatePhase::Downloading);
            (release, cancel, previous)
        };
        let pending = PendingPhase::new(self, previous);

        let url = match self.inner.installer.artifact_url(&release) {
            Ok(url) => url,
            Err(e) => {
                pending.settle();
                self.lock().cancel = None;
                return Err(self.fail(UpdatePhase::Error, e.into()));
            }
        };
        let fallback = format!("update-{}", release.version);
        let dest = self
            .inner
            .download_dir
            .join(artifact_file_name(&url, &fallback));

        info!("downloading {} from {url}", release.version);
        let events = self.inner.events.clone();
        let on_progress =
            move |progress: DownloadProgress| events.emit(UpdateEvent::DownloadProgress(progress));
        let result = self
            .inner
            .downloader
            .download(&url, &dest, &on_progress, &cancel)
            .await;
        pending.settle();

        match result {
            Ok(_) => {
                let artifact = DownloadedArtifact {
                    path: dest,
                    version: release.version.clone(),
                };
                let previous = {
                    let mut state = self.lock();
                    state.cancel = None;
                    state.phase = UpdatePhase::Downloaded;
                    state.artifact.replace(artifact.clone())
                };
                if let Some(previous) = previous
                    && previous.path != artifact.path
                {
                    discard_artifact(&previous).await;
                }

                self.inner.events.emit(UpdateEvent::UpdateDownloaded {
                    version: release.version.clone(),
                    release_notes: release.release_notes.clone(),
                    release_name: release.release_name.clone(),
                    artifact_path: artifact.path.clone(),
                });
                self.spawn_restart_prompt(artifact.clone());
                Ok(artifact)
            }
            Err(DownloadError::Cancelled) => {
                {
                    let mut state = self.lock();
                    state.cancel = None;
                    state.phase = UpdatePhase::Available;
                }
                info!("download of {} cancelled", release.version);
                Err(DownloadError::Cancelled.into())
            }
            Err(e) => {
                self.lock().cancel = None;
                Err(self.fail(UpdatePhase::Error, e.into()))
            }
        }
    }

    /// Cancel the in-flight download. The download call returns
    /// `Cancelled` and the phase reverts to `Available`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidTransition`] when nothing is downloading.
    pub fn cancel_download(&self) -> Result<()> {
        let state = self.lock();
        admit(state.phase, Action::Cancel)?;
        if let Some(cancel) = &state.cancel {
            debug!("cancelling download");
            cancel.cancel();
        }
        Ok(())
    }

    /// Hand the downloaded artifact to the install strategy.
    ///
    /// On success the application is on its way out; the phase stays
    /// `Installing`. On failure the phase reverts to `Downloaded`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::NotAvailableInMode`] in development mode, a
    /// guard error when nothing is downloaded, or the strategy's error.
    pub async fn install(&self) -> Result<()> {
        if !self.inner.packaged {
            return Err(InstallError::NotAvailableInMode.into());
        }

        let artifact = {
            let mut state = self.lock();
            admit(state.phase, Action::Install)?;
            let artifact = state
                .artifact
                .clone()
                .ok_or(InstallError::NothingToInstall)?;
            state.phase = UpdatePhase::Installing;
            artifact
        };
        let pending = PendingPhase::new(self, UpdatePhase::Downloaded);

        info!(
            "installing {} via {:?}",
            artifact.version,
            self.inner.installer.kind()
        );
        let installed = self.inner.installer.install(&artifact).await;
        pending.settle();
        match installed {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(UpdatePhase::Downloaded, e.into())),
        }
    }

    /// Background check that only speaks up when a newer release exists.
    ///
    /// Never emits `update-error`; on anything but a new release the phase
    /// is restored to what it was before.
    pub async fn silent_check(&self) -> SilentCheckOutcome {
        if !self.inner.packaged {
            return SilentCheckOutcome::Unpackaged;
        }

        let previous = {
            let mut state = self.lock();
            if state.phase.is_in_flight() {
                debug!("silent check skipped, updater is {}", state.phase);
                return SilentCheckOutcome::Busy(state.phase);
            }
            let previous = state.phase;
            state.phase = UpdatePhase::Checking;
            previous
        };
        let pending = PendingPhase::new(self, previous);

        let fetched = self.inner.source.fetch_latest().await;
        pending.settle();
        let release = match fetched {
            Ok(release) => release,
            Err(e) => {
                self.lock().phase = previous;
                warn!("silent update check failed: {e}");
                return SilentCheckOutcome::Failed(e.to_string());
            }
        };

        if !is_newer(&release.version, &self.inner.current_version) {
            self.lock().phase = previous;
            return SilentCheckOutcome::UpToDate;
        }

        {
            let mut state = self.lock();
            let downloaded = state
                .artifact
                .as_ref()
                .is_some_and(|a| a.version == release.version);
            if downloaded {
                state.phase = previous;
                return SilentCheckOutcome::AlreadyDownloaded(release.version);
            }
            state.phase = UpdatePhase::Available;
            state.latest = Some(release.clone());
        }

        info!("background check found {}", release.version);
        self.inner
            .events
            .emit(UpdateEvent::available_silent(&release));
        SilentCheckOutcome::UpdateAvailable(release.version)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pass the guard and enter `next` atomically, returning the phase left.
    fn begin(&self, action: Action, next: UpdatePhase) -> Result<UpdatePhase> {
        let mut state = self.lock();
        admit(state.phase, action)?;
        Ok(std::mem::replace(&mut state.phase, next))
    }

    /// Record a surfaced failure: set `phase`, log, emit `update-error`.
    fn fail(&self, phase: UpdatePhase, err: UpdateError) -> UpdateError {
        self.lock().phase = phase;
        error!("update failed: {err}");
        self.inner.events.emit(UpdateEvent::error(&err));
        err
    }

    fn spawn_restart_prompt(&self, artifact: DownloadedArtifact) {
        let updater = self.clone();
        tokio::spawn(async move {
            match updater.inner.prompt.ask(&artifact).await {
                RestartChoice::RestartNow => {
                    if let Err(e) = updater.install().await {
                        warn!("install after restart prompt failed: {e}");
                    }
                }
                RestartChoice::Later => debug!("restart deferred"),
            }
        });
    }
}

/// Puts the phase back when an operation's future is dropped at an await
/// point (task aborted, caller gone). Settled once the operation resumes
/// and takes over the phase itself.
struct PendingPhase<'a> {
    updater: &'a Updater,
    restore: UpdatePhase,
    settled: bool,
}

impl<'a> PendingPhase<'a> {
    fn new(updater: &'a Updater, restore: UpdatePhase) -> Self {
        Self {
            updater,
            restore,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingPhase<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.updater.lock();
        warn!(
            "update operation abandoned while {}, back to {}",
            state.phase, self.restore
        );
        state.phase = self.restore;
        state.cancel = None;
    }
}

#[async_trait]
impl SilentChecker for Updater {
    async fn silent_check(&self) -> SilentCheckOutcome {
        Updater::silent_check(self).await
    }
}

async fn discard_artifact(artifact: &DownloadedArtifact) {
    match tokio::fs::remove_file(&artifact.path).await {
        Ok(()) => debug!("removed superseded artifact {}", artifact.path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "cannot remove superseded artifact {}: {e}",
            artifact.path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::FetchError;
    use crate::scheduler::BackgroundScheduler;
    use crate::settings::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        version: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(version: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                version,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReleaseSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_latest(&self) -> std::result::Result<ReleaseInfo, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.version {
                Some(v) => Ok(ReleaseInfo::new(v)),
                None => Err(FetchError::ServiceError(503)),
            }
        }
    }

    /// Answers "up to date" after a delay.
    struct SlowSource(Duration);

    #[async_trait]
    impl ReleaseSource for SlowSource {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch_latest(&self) -> std::result::Result<ReleaseInfo, FetchError> {
            tokio::time::sleep(self.0).await;
            Ok(ReleaseInfo::new("1.0.0"))
        }
    }

    struct NoopInstaller;

    #[async_trait]
    impl InstallStrategy for NoopInstaller {
        fn kind(&self) -> InstallKind {
            InstallKind::InPlace
        }

        fn artifact_url(
            &self,
            release: &ReleaseInfo,
        ) -> std::result::Result<String, DownloadError> {
            Ok(format!("http://127.0.0.1:9/app-{}", release.version))
        }

        async fn install(&self, _: &DownloadedArtifact) -> std::result::Result<(), InstallError> {
            Err(InstallError::PlatformHandlerFailed("not here".to_owned()))
        }
    }

    fn build_updater(
        source: Arc<dyn ReleaseSource>,
        packaged: bool,
    ) -> (Updater, tokio::sync::mpsc::UnboundedReceiver<UpdateEvent>) {
        let (events, rx) = EventSink::channel();
        let updater = Updater::builder("1.0.0", source)
            .packaged(packaged)
            .installer(Arc::new(NoopInstaller))
            .events(events)
            .build()
            .unwrap();
        (updater, rx)
    }

    #[tokio::test]
    async fn check_finds_newer_release() {
        let (updater, mut rx) = build_updater(FixedSource::new(Some("1.1.0")), true);
        let found = updater.check().await.unwrap();
        assert_eq!(found.unwrap().version, "1.1.0");
        assert_eq!(updater.phase(), UpdatePhase::Available);
        assert_eq!(rx.recv().await.unwrap(), UpdateEvent::CheckingForUpdate);
        assert_eq!(rx.recv().await.unwrap().name(), "update-available");
    }

    #[tokio::test]
    async fn check_reports_current_version_when_up_to_date() {
        let (updater, mut rx) = build_updater(FixedSource::new(Some("1.0.0")), true);
        assert!(updater.check().await.unwrap().is_none());
        assert_eq!(updater.phase(), UpdatePhase::NotAvailable);
        rx.recv().await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            UpdateEvent::UpdateNotAvailable {
                version: "1.0.0".to_owned(),
                dev_mode: false
            }
        );
    }

    #[tokio::test]
    async fn check_failure_moves_to_error_and_emits() {
        let (updater, mut rx) = build_updater(FixedSource::new(None), true);
        let err = updater.check().await.unwrap_err();
        assert!(matches!(err, UpdateError::Fetch(FetchError::ServiceError(503))));
        assert_eq!(updater.phase(), UpdatePhase::Error);
        rx.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().name(), "update-error");

        updater.check().await.unwrap_err();
    }

    #[tokio::test]
    async fn download_from_idle_is_rejected_silently() {
        let (updater, mut rx) = build_updater(FixedSource::new(Some("2.0.0")), true);
        let err = updater.download().await.unwrap_err();
        assert_eq!(err.to_string(), "cannot download while idle");
        assert_eq!(updater.phase(), UpdatePhase::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn install_without_download_is_rejected() {
        let (updater, _rx) = build_updater(FixedSource::new(Some("2.0.0")), true);
        assert!(matches!(
            updater.install().await,
            Err(UpdateError::InvalidTransition {
                action: Action::Install,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn cancel_without_download_is_rejected() {
        let (updater, _rx) = build_updater(FixedSource::new(Some("2.0.0")), true);
        assert!(updater.cancel_download().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dev_mode_check_never_calls_source() {
        let source = FixedSource::new(Some("9.9.9"));
        let (updater, mut rx) = build_updater(Arc::<FixedSource>::clone(&source), false);

        let started = tokio::time::Instant::now();
        assert!(updater.check().await.unwrap().is_none());
        assert!(started.elapsed() >= DEV_CHECK_DELAY);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(updater.phase(), UpdatePhase::NotAvailable);
        assert_eq!(
            rx.recv().await.unwrap(),
            UpdateEvent::UpdateNotAvailable {
                version: "1.0.0".to_owned(),
                dev_mode: true
            }
        );
    }

    #[tokio::test]
    async fn silent_check_emits_only_when_newer() {
        let (updater, mut rx) = build_updater(FixedSource::new(Some("1.0.0")), true);
        assert_eq!(updater.silent_check().await, SilentCheckOutcome::UpToDate);
        assert_eq!(updater.phase(), UpdatePhase::Idle);
        assert!(rx.try_recv().is_err());

        let (updater, mut rx) = build_updater(FixedSource::new(Some("1.2.0")), true);
        assert_eq!(
            updater.silent_check().await,
            SilentCheckOutcome::UpdateAvailable("1.2.0".to_owned())
        );
        assert_eq!(updater.phase(), UpdatePhase::Available);
        assert_eq!(rx.recv().await.unwrap().name(), "update-available-silent");
    }

    #[tokio::test]
    async fn silent_check_failure_restores_phase_without_event() {
        let (updater, mut rx) = build_updater(FixedSource::new(None), true);
        assert!(matches!(
            updater.silent_check().await,
            SilentCheckOutcome::Failed(_)
        ));
        assert_eq!(updater.phase(), UpdatePhase::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn silent_check_is_skipped_in_dev_mode() {
        let source = FixedSource::new(Some("2.0.0"));
        let (updater, _rx) = build_updater(Arc::<FixedSource>::clone(&source), false);
        assert_eq!(updater.silent_check().await, SilentCheckOutcome::Unpackaged);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_check_restores_previous_phase() {
        let (updater, _rx) = build_updater(Arc::new(SlowSource(Duration::from_secs(5))), true);
        let task = {
            let updater = updater.clone();
            tokio::spawn(async move { updater.check().await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(updater.phase(), UpdatePhase::Checking);
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(updater.phase(), UpdatePhase::Idle);
        assert!(updater.check().await.unwrap().is_none());
        assert_eq!(updater.phase(), UpdatePhase::NotAvailable);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_silent_check_restores_previous_phase() {
        let (updater, _rx) = build_updater(Arc::new(SlowSource(Duration::from_secs(5))), true);
        let task = {
            let updater = updater.clone();
            tokio::spawn(async move { updater.silent_check().await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(updater.phase(), UpdatePhase::Checking);
        task.abort();
        let _ = task.await;
        assert_eq!(updater.phase(), UpdatePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_restart_during_silent_check_leaves_updater_usable() {
        let (updater, _rx) = build_updater(Arc::new(SlowSource(Duration::from_secs(5))), true);
        let mut scheduler = BackgroundScheduler::new(
            Arc::new(updater.clone()),
            Arc::new(MemoryStore::new()),
            true,
        );
        scheduler.start();

        // The initial check fires at 10s and is still fetching at 11s.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(updater.phase(), UpdatePhase::Checking);
        scheduler.restart();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(updater.phase(), UpdatePhase::Idle);
        assert!(updater.check().await.unwrap().is_none());

        scheduler.stop();
    }
}
