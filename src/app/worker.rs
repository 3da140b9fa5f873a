//! Reconciliation worker: a periodic sweep that resolves transactions
//! stuck in SWAP_SUBMITTED past the staleness threshold.
//!
//! Carries no in-memory batch list; every tick rediscovers stale work from
//! persisted state, so the worker is safe to restart at any time and to
//! overlap with live traffic (all mutations go through the same
//! compare-and-set transitions as the live path).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::service::InvestmentService;

/// Reconciliation worker configuration
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often to sweep
    pub poll_interval: Duration,
    /// Minimum age before an in-flight submission becomes eligible
    pub stale_after_secs: i64,
    /// Stale rows to process per sweep
    pub batch_size: i64,
    pub enabled: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            stale_after_secs: 60,
            batch_size: 20,
            enabled: true,
        }
    }
}

/// Spawn the reconciliation worker as a background task.
///
/// Returns the task handle and a shutdown sender; send `true` to stop the
/// loop after the current sweep.
pub fn spawn_reconciler(
    service: Arc<InvestmentService>,
    config: ReconcilerConfig,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        if !config.enabled {
            info!("Reconciliation worker disabled");
            return;
        }
        info!(
            interval_secs = config.poll_interval.as_secs(),
            stale_after_secs = config.stale_after_secs,
            batch_size = config.batch_size,
            "Reconciliation worker started"
        );

        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service
                        .reconcile_stale(config.stale_after_secs, config.batch_size)
                        .await
                    {
                        Ok(0) => {}
                        Ok(resolved) => info!(resolved, "Reconciliation sweep complete"),
                        // Dependency failures are deferred to the next sweep.
                        Err(e) => error!(error = %e, "Reconciliation sweep failed"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Reconciliation worker shutting down");
                        break;
                    }
                }
            }
        }
    });

    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciler_config_default() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.stale_after_secs, 60);
        assert_eq!(config.batch_size, 20);
        assert!(config.enabled);
    }
}
