//! # Retention Sweeper
//!
//! Periodically prunes the measurement log and old snapshots. The first
//! sweep runs at startup; a failed sweep is logged and retried on the next
//! tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use thermo_db::SweepReport;

use crate::error::BridgeResult;
use crate::ports::RecordStore;

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Shortest pause between sweeps; shorter intervals are raised to it.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct RetentionSweeper {
    store: Arc<dyn RecordStore>,
    retention_days: u32,
    interval: Duration,
    cancel: CancellationToken,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn RecordStore>,
        retention_days: u32,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        RetentionSweeper {
            store,
            retention_days,
            interval: interval.max(MIN_SWEEP_INTERVAL),
            cancel,
        }
    }

    /// Runs one sweep.
    pub async fn sweep_once(&self) -> BridgeResult<SweepReport> {
        self.store.sweep(self.retention_days).await
    }

    /// Sweeps on every tick until cancelled.
    pub async fn run(self) {
        info!(
            retention_days = self.retention_days,
            interval_secs = self.interval.as_secs(),
            "Retention sweeper starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) => debug!(?report, "Retention sweep finished"),
                        Err(e) => error!(error = %e, "Retention sweep failed"),
                    }
                }
            }
        }

        info!("Retention sweeper stopped");
    }
}
