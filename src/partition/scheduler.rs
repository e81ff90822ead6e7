//! Background partition maintenance.
//!
//! Runs a maintenance pass at startup and then on a fixed interval.
//! Transient store failures are retried with backoff; anything still
//! failing is logged and left to the next tick.

use std::time::Duration;

use backon::Retryable;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{MaintenanceReport, PartitionError, PartitionManager};
use crate::utils::retry::RetryConfig;

/// Periodic lookahead, retention and analyze passes.
pub struct PartitionScheduler {
    manager: PartitionManager,
    retry: RetryConfig,
    interval: Duration,
}

impl PartitionScheduler {
    /// Scheduler ticking every `partitions.interval_secs`.
    pub fn new(manager: PartitionManager, retry: RetryConfig) -> Self {
        let interval = Duration::from_secs(manager.config().interval_secs.max(1));
        Self {
            manager,
            retry,
            interval,
        }
    }

    /// Set custom maintenance interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one maintenance pass as of today, retrying transient failures.
    pub async fn run_once(&self) -> Result<MaintenanceReport, PartitionError> {
        (|| self.manager.run_maintenance(Utc::now().date_naive()))
            .retry(self.retry.backoff())
            .when(PartitionError::is_transient)
            .notify(|err: &PartitionError, dur: Duration| {
                debug!(error = %err, delay = ?dur, "Partition maintenance failed, retrying");
            })
            .await
    }

    /// Spawn the scheduler as a background task.
    ///
    /// The first pass runs immediately. The task stops when
    /// [`SchedulerHandle::stop`] is called or the handle is dropped.
    pub fn spawn(self) -> SchedulerHandle {
        let (cancel, mut cancelled) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = cancelled.changed() => break,
                }

                match self.run_once().await {
                    Ok(report) if report.changed() => info!(
                        created = report.created.len(),
                        dropped = report.dropped.len(),
                        analyzed = report.analyzed,
                        "Partition maintenance applied changes"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(
                        error = %e,
                        "Partition maintenance failed; retrying next interval"
                    ),
                }
            }
            info!("Partition scheduler stopped");
        });

        SchedulerHandle { cancel, task }
    }
}

/// Handle to a running [`PartitionScheduler`].
pub struct SchedulerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler and wait for the current pass to finish.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Partition scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
