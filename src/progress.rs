//! Download progress snapshots.
//!
//! Provides callback-based progress reporting that decouples the downloader
//! from whatever presents it (CLI line, host bridge event, GUI signal).

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A point-in-time view of an artifact download.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Completion in percent (0-100). `0` while the total size is unknown.
    pub percent: f64,
    /// Average throughput since the request started.
    pub bytes_per_second: f64,
    /// Bytes received so far.
    pub transferred: u64,
    /// Total size announced by the server, `0` if unknown.
    pub total: u64,
}

impl DownloadProgress {
    /// Build a snapshot from raw counters and the time elapsed since the
    /// request was issued.
    pub fn from_counters(transferred: u64, total: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let bytes_per_second = if secs > 0.0 {
            transferred as f64 / secs
        } else {
            0.0
        };
        let percent = if total > 0 {
            (transferred as f64 / total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            percent,
            bytes_per_second,
            transferred,
            total,
        }
    }
}

/// Accumulates received bytes for one download and produces snapshots.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    transferred: u64,
    total: u64,
}

impl ProgressTracker {
    /// Start tracking a download whose size is `total` bytes (`0` if unknown).
    pub fn new(total: u64, started: Instant) -> Self {
        Self {
            started,
            transferred: 0,
            total,
        }
    }

    /// Record a received chunk and return the updated snapshot.
    pub fn record(&mut self, chunk_len: usize) -> DownloadProgress {
        self.transferred = self.transferred.saturating_add(chunk_len as u64);
        self.snapshot()
    }

    /// Current snapshot without recording anything.
    pub fn snapshot(&self) -> DownloadProgress {
        DownloadProgress::from_counters(self.transferred, self.total, self.started.elapsed())
    }

    /// Bytes received so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}

/// Callback receiving progress snapshots, taken by reference by
/// [`Downloader::download`](crate::download::Downloader::download).
///
/// Invoked synchronously on the downloading task for every received chunk,
/// so implementations must be cheap (forward to a channel, update a bar).
pub type ProgressCallback = dyn Fn(DownloadProgress) + Send + Sync;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn zero_elapsed_reports_zero_throughput() {
        let p = DownloadProgress::from_counters(1024, 2048, Duration::ZERO);
        assert!(p.bytes_per_second.abs() < f64::EPSILON);
        assert!((p.percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_total_reports_zero_percent() {
        let p = DownloadProgress::from_counters(4096, 0, Duration::from_secs(2));
        assert!(p.percent.abs() < f64::EPSILON);
        assert!((p.bytes_per_second - 2048.0).abs() < f64::EPSILON);
        assert_eq!(p.total, 0);
    }

    #[test]
    fn percent_is_capped_when_server_undercounts() {
        let p = DownloadProgress::from_counters(150, 100, Duration::from_secs(1));
        assert!((p.percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tracker_accumulates_chunks() {
        let mut tracker = ProgressTracker::new(300, Instant::now());
        tracker.record(100);
        let p = tracker.record(200);
        assert_eq!(p.transferred, 300);
        assert_eq!(tracker.transferred(), 300);
        assert!((p.percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let p = DownloadProgress::from_counters(10, 20, Duration::from_secs(1));
        let json = serde_json::to_value(p).unwrap();
        assert!(json.get("bytesPerSecond").is_some());
        assert_eq!(json["transferred"], 10);
        assert_eq!(json["total"], 20);
    }

    #[test]
    fn callback_receives_snapshots() {
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback: Box<ProgressCallback> = Box::new(move |p| {
            let Ok(mut guard) = seen_clone.lock() else {
                return;
            };
            guard.push(p.transferred);
        });

        let mut tracker = ProgressTracker::new(0, Instant::now());
        callback(tracker.record(5));
        callback(tracker.record(7));

        let guard = seen.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(*guard, vec![5, 12]);
    }
}
