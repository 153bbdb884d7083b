use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use transit_core::{Booking, BookingStatus, BookingUpdate, CoreError, CoreResult, DeviceCredential};
use uuid::Uuid;

use crate::manager::ReservationEngine;
use crate::models::{CloseReport, SweepReport};

#[derive(Debug, Clone, Copy)]
pub struct ReconciliationPolicy {
    /// How long a `Pending` or `Rescheduling` booking may sit untouched.
    pub pending_hold: Duration,
    /// How long after departure an unresolved booking is failed.
    pub grace: Duration,
}

enum Outcome {
    RolledForward,
    Abandoned,
    Resumed,
    Failed,
    Untouched,
}

/// Settles bookings once trips have run, and cleans up after partial
/// failures. Every step is a conditional write, so reruns are no-ops.
pub struct TicketReconciler {
    engine: Arc<ReservationEngine>,
    policy: ReconciliationPolicy,
}

impl TicketReconciler {
    pub fn new(engine: Arc<ReservationEngine>, policy: ReconciliationPolicy) -> Self {
        Self { engine, policy }
    }

    pub async fn close_trip(&self, trip_id: Uuid) -> CoreResult<CloseReport> {
        let trip = self.engine.trip(trip_id).await?;
        if trip.completed {
            info!("Trip {} already closed", trip_id);
            return Ok(CloseReport {
                trip_id,
                already_closed: true,
                ..CloseReport::default()
            });
        }

        let ledger = &self.engine.stores.ledger;
        let completed = ledger
            .transition_for_trip(trip_id, BookingStatus::Verified, BookingStatus::Completed)
            .await?;
        let failed = ledger
            .transition_for_trip(trip_id, BookingStatus::Booked, BookingStatus::Failed)
            .await?;
        self.engine.stores.inventory.mark_completed(trip_id).await?;

        info!(
            "Closed trip {}: {} completed, {} failed",
            trip_id, completed, failed
        );
        Ok(CloseReport {
            trip_id,
            completed,
            failed,
            already_closed: false,
        })
    }

    /// Closure requested by the terminal of the vehicle running the trip.
    pub async fn close_trip_for_device(&self, credential: &DeviceCredential, trip_id: Uuid) -> CoreResult<CloseReport> {
        self.engine.leases().authorize(credential).await?;
        let trip = self.engine.trip(trip_id).await?;
        if trip.vehicle_id != credential.vehicle_id {
            return Err(CoreError::Forbidden(format!("Trip {} belongs to another vehicle", trip_id)));
        }
        self.close_trip(trip_id).await
    }

    /// One pass over everything that needs attention as of `now`.
    /// Anomalies are logged and skipped; the next pass retries them.
    pub async fn sweep(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let mut report = SweepReport {
            ran_at: Some(now),
            ..SweepReport::default()
        };
        let ledger = &self.engine.stores.ledger;
        let stale_cutoff = now - self.policy.pending_hold;

        for booking in ledger.list_stale(&[BookingStatus::Pending], stale_cutoff).await? {
            let outcome = self.settle_pending(&booking).await;
            tally(&mut report, &booking, outcome);
        }

        for booking in ledger.list_stale(&[BookingStatus::Rescheduling], stale_cutoff).await? {
            let outcome = self.engine.resume_reschedule(&booking).await.map(|_| Outcome::Resumed);
            tally(&mut report, &booking, outcome);
        }

        let departed = [BookingStatus::Booked, BookingStatus::Verified, BookingStatus::Rescheduling];
        for booking in ledger.list_departed(&departed, now - self.policy.grace).await? {
            let outcome = self.fail_departed(&booking, &departed).await;
            tally(&mut report, &booking, outcome);
        }

        let touched = report.rolled_forward
            + report.abandoned
            + report.reschedules_resumed
            + report.departed_failed
            + report.skipped;
        if touched > 0 {
            info!(
                "Sweep: {} rolled forward, {} abandoned, {} reschedules resumed, {} failed after departure, {} skipped",
                report.rolled_forward,
                report.abandoned,
                report.reschedules_resumed,
                report.departed_failed,
                report.skipped
            );
        }
        Ok(report)
    }

    // A Pending booking whose seat is already confirmed for it lost only
    // its status write. Anything else is an expired hold.
    async fn settle_pending(&self, booking: &Booking) -> CoreResult<Outcome> {
        let stores = &self.engine.stores;
        let trip = self.engine.trip(booking.trip_id).await?;
        let seat_is_ours = trip
            .seat(booking.seat_number)
            .is_some_and(|s| s.state.is_confirmed_for(booking.id));

        if seat_is_ours {
            let moved = stores
                .ledger
                .transition(booking.id, &[BookingStatus::Pending], &BookingUpdate::status(BookingStatus::Booked))
                .await?;
            if !moved {
                return Ok(Outcome::Untouched);
            }
            stores
                .accounts
                .link_booking(booking.passenger_id, booking.id, None)
                .await?;
            info!("Rolled booking {} forward to Booked", booking.id);
            return Ok(Outcome::RolledForward);
        }

        let moved = stores
            .ledger
            .transition(booking.id, &[BookingStatus::Pending], &BookingUpdate::status(BookingStatus::Abandoned))
            .await?;
        if !moved {
            return Ok(Outcome::Untouched);
        }
        stores
            .inventory
            .clear_hold(booking.trip_id, booking.seat_number, booking.id)
            .await?;
        stores
            .accounts
            .unlink_booking(booking.passenger_id, booking.id)
            .await?;
        info!("Abandoned expired hold of booking {}", booking.id);
        Ok(Outcome::Abandoned)
    }

    async fn fail_departed(&self, booking: &Booking, from: &[BookingStatus]) -> CoreResult<Outcome> {
        let moved = self
            .engine
            .stores
            .ledger
            .transition(booking.id, from, &BookingUpdate::status(BookingStatus::Failed))
            .await?;
        if !moved {
            return Ok(Outcome::Untouched);
        }
        warn!(
            "Booking {} still {} after trip {} departed; marked Failed",
            booking.id, booking.status, booking.trip_id
        );
        Ok(Outcome::Failed)
    }
}

fn tally(report: &mut SweepReport, booking: &Booking, outcome: CoreResult<Outcome>) {
    match outcome {
        Ok(Outcome::RolledForward) => report.rolled_forward += 1,
        Ok(Outcome::Abandoned) => report.abandoned += 1,
        Ok(Outcome::Resumed) => report.reschedules_resumed += 1,
        Ok(Outcome::Failed) => report.departed_failed += 1,
        Ok(Outcome::Untouched) => {}
        Err(e) => {
            warn!("Skipping booking {} during sweep: {}", booking.id, e);
            report.skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use transit_catalog::SeatClaim;
    use transit_core::ErrorKind;
    use transit_shared::NotificationKind;

    #[tokio::test]
    async fn test_close_trip_settles_bookings_once() {
        let fx = Fixture::new().await;
        let riding = Uuid::new_v4();
        let no_show = Uuid::new_v4();
        let rode = fx.initialize(riding, 1, "txn-1").await.unwrap();
        fx.confirm("txn-1", "cus_1").await.unwrap();
        let missed = fx.initialize(no_show, 2, "txn-2").await.unwrap();
        fx.confirm("txn-2", "cus_2").await.unwrap();

        let credential = fx.engine.leases().acquire(fx.vehicle.id).await.unwrap();
        fx.engine.verify_booking(&credential, rode.id, riding).await.unwrap();

        let reconciler = fx.reconciler();
        let report = reconciler.close_trip_for_device(&credential, fx.trip.id).await.unwrap();
        assert_eq!((report.completed, report.failed), (1, 1));

        let first = fx.engine.trip(fx.trip.id).await.unwrap();
        assert!(first.completed);

        let again = reconciler.close_trip(fx.trip.id).await.unwrap();
        assert!(again.already_closed);
        assert_eq!((again.completed, again.failed), (0, 0));
        assert_eq!(fx.engine.trip(fx.trip.id).await.unwrap(), first);

        assert_eq!(
            fx.engine.get_booking(riding, rode.id).await.unwrap().status,
            BookingStatus::Completed
        );
        assert_eq!(
            fx.engine.get_booking(no_show, missed.id).await.unwrap().status,
            BookingStatus::Failed
        );

        let err = fx.initialize(Uuid::new_v4(), 3, "txn-3").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_sweep_rolls_forward_and_abandons() {
        let fx = Fixture::new().await;
        let stores = fx.store.stores();

        // Seat written, status write lost.
        let lost = fx.initialize(Uuid::new_v4(), 1, "txn-1").await.unwrap();
        let claim = SeatClaim::new(lost.id, lost.start_point.clone(), lost.end_point.clone());
        assert!(stores
            .inventory
            .confirm_seat(fx.trip.id, 1, &claim, lost.fare.base_fee)
            .await
            .unwrap());

        // Never paid.
        let idle = fx.initialize(Uuid::new_v4(), 2, "txn-2").await.unwrap();

        let reconciler = fx.reconciler();
        let early = reconciler.sweep(Utc::now()).await.unwrap();
        assert_eq!((early.rolled_forward, early.abandoned), (0, 0));

        let report = reconciler.sweep(Utc::now() + Duration::minutes(16)).await.unwrap();
        assert_eq!(report.rolled_forward, 1);
        assert_eq!(report.abandoned, 1);

        let lost = stores.ledger.get(lost.id).await.unwrap().unwrap();
        assert_eq!(lost.status, BookingStatus::Booked);
        let idle = stores.ledger.get(idle.id).await.unwrap().unwrap();
        assert_eq!(idle.status, BookingStatus::Abandoned);

        let trip = fx.engine.trip(fx.trip.id).await.unwrap();
        assert!(trip.seat(2).unwrap().is_free());
        assert_eq!(trip.booked_seats, 1);

        let rerun = reconciler.sweep(Utc::now() + Duration::minutes(16)).await.unwrap();
        assert_eq!((rerun.rolled_forward, rerun.abandoned), (0, 0));
    }

    #[tokio::test]
    async fn test_payment_after_abandon_is_flagged() {
        let fx = Fixture::new().await;
        let passenger = Uuid::new_v4();
        let booking = fx.initialize(passenger, 1, "txn-late").await.unwrap();

        let report = fx.reconciler().sweep(Utc::now() + Duration::minutes(16)).await.unwrap();
        assert_eq!(report.abandoned, 1);

        let err = fx.confirm("txn-late", "cus_1").await.unwrap_err();
        assert!(err.is_payment_not_applied());
        assert!(!err.is_seat_conflict());
        assert_eq!(fx.notifications.kinds().await, vec![NotificationKind::Error]);

        let stored = fx.engine.get_booking(passenger, booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Abandoned);
        let trip = fx.engine.trip(fx.trip.id).await.unwrap();
        assert!(trip.seat(1).unwrap().is_free());
        assert_eq!(trip.booked_seats, 0);
        assert!(fx.store.stores().accounts.linked_bookings(passenger).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_fails_departed_bookings() {
        let fx = Fixture::new().await;
        let passenger = Uuid::new_v4();
        let booking = fx.initialize(passenger, 1, "txn-1").await.unwrap();
        fx.confirm("txn-1", "cus_1").await.unwrap();

        let after_departure = fx.trip.departure + Duration::hours(7);
        let report = fx.reconciler().sweep(after_departure).await.unwrap();
        assert_eq!(report.departed_failed, 1);
        assert_eq!(
            fx.engine.get_booking(passenger, booking.id).await.unwrap().status,
            BookingStatus::Failed
        );
    }
}
