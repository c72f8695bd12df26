use std::time::Duration;

use tokio::time::{interval_at, Instant};
use tracing::{error, info};

use crate::service::AlertService;

pub const DEFAULT_EXPIRY_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_STATISTICS_INTERVAL: Duration = Duration::from_secs(3600);

/// Periodic background work: the expiry sweep and the statistics log.
///
/// A failing sweep is logged and never breaks the loop; the next run
/// still happens on schedule.
pub struct AlertScheduler {
    service: AlertService,
    expiry_interval: Duration,
    statistics_interval: Duration,
}

impl AlertScheduler {
    pub fn new(service: AlertService) -> Self {
        Self {
            service,
            expiry_interval: DEFAULT_EXPIRY_INTERVAL,
            statistics_interval: DEFAULT_STATISTICS_INTERVAL,
        }
    }

    pub fn expiry_interval(mut self, v: Duration) -> Self {
        self.expiry_interval = v;

        self
    }

    pub fn statistics_interval(mut self, v: Duration) -> Self {
        self.statistics_interval = v;

        self
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let task_handle = tokio::spawn(async move {
            let mut expiry = interval_at(
                Instant::now() + self.expiry_interval,
                self.expiry_interval,
            );
            let mut statistics = interval_at(
                Instant::now() + self.statistics_interval,
                self.statistics_interval,
            );

            info!(
                expiry_interval = ?self.expiry_interval,
                statistics_interval = ?self.statistics_interval,
                "alert scheduler started"
            );

            loop {
                tokio::select! {
                    _ = expiry.tick() => {
                        if let Err(err) = self.service.expire_old_alerts().await {
                            error!(error = %err, "scheduled expiry sweep failed");
                        }
                    }
                    _ = statistics.tick() => {
                        match self.service.get_alert_statistics(None).await {
                            Ok(stats) => info!(
                                active = stats.active,
                                unacknowledged = stats.unacknowledged,
                                total = stats.total,
                                "alert statistics"
                            ),
                            Err(err) => error!(error = %err, "scheduled statistics log failed"),
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("alert scheduler received shutdown signal, stopping");

                        break;
                    }
                }
            }
        });

        SchedulerHandle {
            task_handle,
            shutdown_tx,
        }
    }
}

/// Handle to the running scheduler loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    task_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl SchedulerHandle {
    /// Signals the loop to stop and waits for it to finish.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        let _ = self.shutdown_tx.send(());

        self.task_handle.await
    }
}
