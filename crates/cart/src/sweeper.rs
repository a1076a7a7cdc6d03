//! Background task driving [`CartController::tick`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::controller::CartController;

/// Spawns the expiry sweeper. It ticks every `period` until `shutdown` is
/// cancelled.
///
/// A failed tick is logged and retried on the next period.
pub fn spawn_sweeper(
    controller: Arc<CartController>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_secs = period.as_secs(), "expiry sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let now = controller.now();
                    match controller.tick(now).await {
                        Ok(report) => {
                            for notice in &report.notices {
                                tracing::debug!(user_id = %notice.user_id, "{notice}");
                            }
                        }
                        Err(e) => {
                            metrics::counter!("reservation_sweep_failures_total").increment(1);
                            tracing::error!(
                                error = %e,
                                retryable = e.is_retryable(),
                                "expiry sweep failed"
                            );
                        }
                    }
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    })
}
