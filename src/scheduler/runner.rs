//! Background check timers.
//!
//! Arms a recurring silent check every `interval_hours` hours and, on the
//! first start only, a deferred initial check. Timers are tokio tasks sharing
//! one cancellation token, so `restart()` and `Drop` tear them all down.
//! Cancellation is only observed between checks; a check already running is
//! left to finish so it can restore the updater's phase.

use crate::scheduler::tasks::{SilentCheckOutcome, SilentChecker, Trigger};
use crate::settings::{AutoCheckSettings, SettingsStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default delay before the initial check.
pub const INITIAL_CHECK_DELAY: Duration = Duration::from_secs(10);

/// What the scheduler armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// Development build; no timers.
    Unpackaged,
    /// Auto-check is switched off in settings; no timers.
    Disabled,
    /// Timers are running.
    Armed {
        /// Recurring check interval.
        interval: Duration,
        /// Whether the one-shot initial check was armed too.
        initial_check: bool,
    },
}

/// Runs silent update checks on a timer.
///
/// Must be started from within a tokio runtime.
pub struct BackgroundScheduler {
    checker: Arc<dyn SilentChecker>,
    store: Arc<dyn SettingsStore>,
    packaged: bool,
    initial_delay: Duration,
    initial_pending: bool,
    armed: Option<CancellationToken>,
    outcome_tx: Option<mpsc::UnboundedSender<SilentCheckOutcome>>,
}

impl BackgroundScheduler {
    /// Create a stopped scheduler.
    pub fn new(
        checker: Arc<dyn SilentChecker>,
        store: Arc<dyn SettingsStore>,
        packaged: bool,
    ) -> Self {
        Self {
            checker,
            store,
            packaged,
            initial_delay: INITIAL_CHECK_DELAY,
            initial_pending: true,
            armed: None,
            outcome_tx: None,
        }
    }

    /// Override the initial check delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Forward every check outcome on `tx`.
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<SilentCheckOutcome>) -> Self {
        self.outcome_tx = Some(tx);
        self
    }

    /// Read settings and arm timers. The initial check is armed only on the
    /// first call over the scheduler's lifetime, and that first call consumes
    /// it even if nothing gets armed.
    pub fn start(&mut self) -> SchedulerStatus {
        self.disarm();
        let with_initial = std::mem::replace(&mut self.initial_pending, false);
        self.arm(with_initial)
    }

    /// Cancel all timers and re-read settings. Never re-arms the initial check.
    pub fn restart(&mut self) -> SchedulerStatus {
        self.disarm();
        self.initial_pending = false;
        self.arm(false)
    }

    /// Cancel all timers.
    pub fn stop(&mut self) {
        if self.armed.is_some() {
            info!("background update checks stopped");
        }
        self.disarm();
    }

    /// Whether any timer is armed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    fn disarm(&mut self) {
        if let Some(cancel) = self.armed.take() {
            cancel.cancel();
        }
    }

    fn arm(&mut self, with_initial: bool) -> SchedulerStatus {
        if !self.packaged {
            debug!("development build, background update checks off");
            return SchedulerStatus::Unpackaged;
        }
        let settings = AutoCheckSettings::load(self.store.as_ref());
        if !settings.enabled {
            info!("automatic update checks disabled");
            return SchedulerStatus::Disabled;
        }

        let interval = settings.interval();
        let cancel = CancellationToken::new();
        self.spawn_periodic(interval, cancel.clone());
        if with_initial {
            self.spawn_initial(cancel.clone());
        }
        info!(
            "background update checks every {}h{}",
            settings.interval_hours,
            if with_initial { " (initial check armed)" } else { "" }
        );
        self.armed = Some(cancel);
        SchedulerStatus::Armed {
            interval,
            initial_check: with_initial,
        }
    }

    fn spawn_periodic(&self, period: Duration, cancel: CancellationToken) {
        let checker = Arc::clone(&self.checker);
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        run_check(checker.as_ref(), Trigger::Periodic, tx.as_ref()).await;
                    }
                }
            }
        });
    }

    fn spawn_initial(&self, cancel: CancellationToken) {
        let checker = Arc::clone(&self.checker);
        let tx = self.outcome_tx.clone();
        let delay = self.initial_delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    run_check(checker.as_ref(), Trigger::Initial, tx.as_ref()).await;
                }
            }
        });
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run_check(
    checker: &dyn SilentChecker,
    trigger: Trigger,
    tx: Option<&mpsc::UnboundedSender<SilentCheckOutcome>>,
) {
    debug!("running {trigger} update check");
    let outcome = checker.silent_check().await;
    match &outcome {
        SilentCheckOutcome::Failed(_) => warn!("{trigger} update check: {}", outcome.summary()),
        o if o.ran() => info!("{trigger} update check: {}", outcome.summary()),
        _ => debug!("{trigger} update check: {}", outcome.summary()),
    }
    if let Some(tx) = tx
        && tx.send(outcome).is_err()
    {
        debug!("scheduler outcome channel closed");
    }
}
