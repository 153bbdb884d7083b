use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use transit_reservation::TicketReconciler;

/// Runs the reconciliation sweep every `period` until `shutdown` flips.
/// A failed pass is logged; the next tick retries.
pub async fn start_reconciliation_worker(
    reconciler: Arc<TicketReconciler>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Reconciliation worker started, sweeping every {:?}", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match reconciler.sweep(Utc::now()).await {
                    Ok(report) => debug!("Sweep finished: {:?}", report),
                    Err(e) => error!("Reconciliation sweep failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Reconciliation worker stopping");
                    break;
                }
            }
        }
    }
}
