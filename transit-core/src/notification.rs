use async_trait::async_trait;
use transit_shared::BookingNotification;

use crate::CoreResult;

/// Outbound passenger notifications. Callers log failures and move on;
/// a notification error never fails a booking operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &BookingNotification) -> CoreResult<()>;
}

/// Writes notifications to the log. Used when no broker is configured.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &BookingNotification) -> CoreResult<()> {
        tracing::info!(
            "Notification {} for passenger {} (booking {:?})",
            event.kind.as_str(),
            event.passenger_id,
            event.booking_id
        );
        Ok(())
    }
}
