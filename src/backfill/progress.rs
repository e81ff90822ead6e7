//! Time-throttled progress reporting.

use std::time::{Duration, Instant};

use tracing::info;

/// Point-in-time view of a running backfill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub done: u64,
    pub failed: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl Progress {
    /// Runs attempted per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.done + self.failed) as f64 / secs
        } else {
            0.0
        }
    }

    /// Time left at the current rate; `None` before any progress.
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.throughput();
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.done + self.failed);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            ((self.done + self.failed) as f64 / self.total as f64 * 100.0).min(100.0)
        }
    }
}

/// Logs progress at most once per interval, regardless of chunk size.
pub(crate) struct ProgressReporter {
    started: Instant,
    last_report: Instant,
    interval: Duration,
    total: u64,
}

impl ProgressReporter {
    pub(crate) fn new(total: u64, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_report: now,
            interval,
            total,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn snapshot(&self, done: u64, failed: u64) -> Progress {
        Progress {
            done,
            failed,
            total: self.total,
            elapsed: self.elapsed(),
        }
    }

    /// Log if the interval has passed since the last line.
    pub(crate) fn maybe_report(&mut self, done: u64, failed: u64) {
        if self.last_report.elapsed() < self.interval {
            return;
        }
        self.last_report = Instant::now();
        let progress = self.snapshot(done, failed);
        info!(
            processed = progress.done,
            failed = progress.failed,
            estimated_total = progress.total,
            percent = format_args!("{:.1}", progress.percent()),
            runs_per_sec = format_args!("{:.1}", progress.throughput()),
            eta_secs = progress.eta().map(|d| d.as_secs()),
            "Backfill progress"
        );
    }
}
