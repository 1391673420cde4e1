//! Background update checks.
//!
//! Runs silent update checks on a timer driven by the persisted
//! auto-check settings.

pub mod runner;
pub mod tasks;

pub use runner::{BackgroundScheduler, INITIAL_CHECK_DELAY, SchedulerStatus};
pub use tasks::{SilentCheckOutcome, SilentChecker, Trigger};
