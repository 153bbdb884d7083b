use tracing::{error, info, warn};
use transit_core::{Booking, BookingStatus, BookingUpdate, CoreError, CoreResult};
use transit_shared::{BookingNotification, NotificationKind};
use uuid::Uuid;

use crate::manager::ReservationEngine;
use crate::models::RescheduleRequest;

impl ReservationEngine {
    /// Moves a booking to another seat, reserving the new seat before the
    /// old one is released.
    ///
    /// The old booking sits in `Rescheduling` while the replacement is
    /// initialized and confirmed. If that fails the old booking is restored
    /// untouched; if the process dies in between, the sweep resumes it.
    pub async fn reschedule_booking(
        &self,
        passenger_id: Uuid,
        old_booking_id: Uuid,
        req: RescheduleRequest,
    ) -> CoreResult<Booking> {
        let old = self.get_booking(passenger_id, old_booking_id).await?;

        let previous = old.status;
        if !matches!(previous, BookingStatus::Booked | BookingStatus::Pending) {
            return Err(CoreError::Conflict(format!(
                "Booking {} cannot be rescheduled while {}",
                old.id, previous
            )));
        }
        if old.trip_id == req.trip_id && old.seat_number == req.seat_number {
            return Err(CoreError::InvalidArgument("New seat is the same as the current one".into()));
        }

        if !self
            .stores
            .ledger
            .transition(old.id, &[previous], &BookingUpdate::status(BookingStatus::Rescheduling))
            .await?
        {
            return Err(CoreError::Conflict(format!("Booking {} changed concurrently", old.id)));
        }

        let replacement = match self.initialize(passenger_id, &req.as_initialize(), Some(old.id)).await {
            Ok(booking) => booking,
            Err(e) => {
                self.restore(&old, previous).await;
                return Err(e);
            }
        };

        let confirmed = match self.confirm_replacement(replacement).await {
            Ok(booking) => booking,
            Err((replacement, e)) => {
                self.abandon(&replacement).await;
                self.restore(&old, previous).await;
                return Err(e);
            }
        };

        self.finish_reschedule(&old, &confirmed).await?;
        Ok(confirmed)
    }

    async fn confirm_replacement(&self, replacement: Booking) -> Result<Booking, (Booking, CoreError)> {
        let kept = replacement.clone();
        self.confirm_pending(replacement, None).await.map_err(|e| (kept, e))
    }

    /// Frees the old seat and retires the old booking. Safe to repeat.
    pub(crate) async fn finish_reschedule(&self, old: &Booking, replacement: &Booking) -> CoreResult<()> {
        self.release_any(old).await?;

        let update = BookingUpdate::status(BookingStatus::Rescheduled).replaced_by(replacement.id);
        if !self
            .stores
            .ledger
            .transition(old.id, &[BookingStatus::Rescheduling], &update)
            .await?
        {
            warn!("Booking {} left Rescheduling before it could be retired", old.id);
        }
        self.stores.accounts.unlink_booking(old.passenger_id, old.id).await?;

        info!("Booking {} rescheduled to {}", old.id, replacement.id);
        self.notify(
            BookingNotification::new(old.passenger_id, NotificationKind::Rescheduled, "Your booking was rescheduled")
                .for_booking(replacement.id, replacement.trip_id),
        )
        .await;
        Ok(())
    }

    /// Completes or rolls back a reschedule that stalled in `Rescheduling`.
    /// Returns true if it was completed.
    pub(crate) async fn resume_reschedule(&self, old: &Booking) -> CoreResult<bool> {
        let candidates: Vec<Booking> = self
            .stores
            .ledger
            .list_for_passenger(old.passenger_id)
            .await?
            .into_iter()
            .filter(|b| b.replaces == Some(old.id))
            .collect();

        if let Some(replacement) = candidates
            .iter()
            .find(|b| matches!(b.status, BookingStatus::Booked | BookingStatus::Verified))
        {
            self.finish_reschedule(old, replacement).await?;
            return Ok(true);
        }

        for pending in candidates.iter().filter(|b| b.status == BookingStatus::Pending) {
            self.abandon(pending).await;
        }

        let trip = self.trip(old.trip_id).await?;
        let previous = if trip
            .seat(old.seat_number)
            .is_some_and(|s| s.state.is_confirmed_for(old.id))
        {
            BookingStatus::Booked
        } else {
            BookingStatus::Pending
        };
        self.restore(old, previous).await;
        Ok(false)
    }

    async fn release_any(&self, booking: &Booking) -> CoreResult<()> {
        let released = self
            .stores
            .inventory
            .release_seat(booking.trip_id, booking.seat_number, booking.id, booking.fare.base_fee)
            .await?;
        if !released {
            self.stores
                .inventory
                .clear_hold(booking.trip_id, booking.seat_number, booking.id)
                .await?;
        }
        Ok(())
    }

    // Compensation steps log instead of failing: the caller is already
    // returning the original error.
    async fn restore(&self, old: &Booking, previous: BookingStatus) {
        match self
            .stores
            .ledger
            .transition(old.id, &[BookingStatus::Rescheduling], &BookingUpdate::status(previous))
            .await
        {
            Ok(true) => info!("Booking {} restored to {}", old.id, previous),
            Ok(false) => warn!("Booking {} was not in Rescheduling during restore", old.id),
            Err(e) => error!("Failed to restore booking {}: {}", old.id, e),
        }
    }

    async fn abandon(&self, booking: &Booking) {
        let result = async {
            self.stores
                .ledger
                .transition(
                    booking.id,
                    &[BookingStatus::Pending],
                    &BookingUpdate::status(BookingStatus::Abandoned),
                )
                .await?;
            self.stores
                .inventory
                .clear_hold(booking.trip_id, booking.seat_number, booking.id)
                .await?;
            self.stores
                .accounts
                .unlink_booking(booking.passenger_id, booking.id)
                .await
        }
        .await;

        if let Err(e) = result {
            error!("Failed to abandon booking {}: {}", booking.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use transit_core::ErrorKind;

    fn move_to(fx: &Fixture, seat_number: i32, txn: &str) -> RescheduleRequest {
        RescheduleRequest {
            trip_id: fx.trip.id,
            seat_number,
            start_point_id: fx.start.id,
            end_point_id: fx.end.id,
            fee: 1_200,
            transaction_reference: txn.to_string(),
        }
    }

    #[tokio::test]
    async fn test_reschedule_moves_seat_and_counters() {
        let fx = Fixture::new().await;
        let passenger = Uuid::new_v4();
        let old = fx.initialize(passenger, 1, "txn-1").await.unwrap();
        fx.confirm("txn-1", "cus_1").await.unwrap();

        let new = fx
            .engine
            .reschedule_booking(passenger, old.id, move_to(&fx, 3, "txn-2"))
            .await
            .unwrap();
        assert_eq!(new.status, BookingStatus::Booked);
        assert_eq!(new.replaces, Some(old.id));

        let old = fx.engine.get_booking(passenger, old.id).await.unwrap();
        assert_eq!(old.status, BookingStatus::Rescheduled);
        assert_eq!(old.replaced_by, Some(new.id));

        let trip = fx.engine.trip(fx.trip.id).await.unwrap();
        assert!(trip.seat(1).unwrap().is_free());
        assert!(trip.seat(3).unwrap().state.is_confirmed_for(new.id));
        assert_eq!(trip.booked_seats, 1);
        assert_eq!(trip.booked_revenue, 1_200);

        let linked = fx.store.stores().accounts.linked_bookings(passenger).await.unwrap();
        assert_eq!(linked, vec![new.id]);
    }

    #[tokio::test]
    async fn test_failed_reschedule_keeps_old_seat() {
        let fx = Fixture::new().await;
        let passenger = Uuid::new_v4();
        let old = fx.initialize(passenger, 1, "txn-1").await.unwrap();
        fx.confirm("txn-1", "cus_1").await.unwrap();

        fx.initialize(Uuid::new_v4(), 2, "txn-other").await.unwrap();
        fx.confirm("txn-other", "cus_other").await.unwrap();

        let err = fx
            .engine
            .reschedule_booking(passenger, old.id, move_to(&fx, 2, "txn-2"))
            .await
            .unwrap_err();
        assert!(err.is_seat_conflict());

        let restored = fx.engine.get_booking(passenger, old.id).await.unwrap();
        assert_eq!(restored.status, BookingStatus::Booked);

        let trip = fx.engine.trip(fx.trip.id).await.unwrap();
        assert!(trip.seat(1).unwrap().state.is_confirmed_for(old.id));
        assert_eq!(trip.booked_seats, 2);
        assert!(trip.counters_consistent());
    }

    #[tokio::test]
    async fn test_reschedule_rejects_same_seat_and_terminal_booking() {
        let fx = Fixture::new().await;
        let passenger = Uuid::new_v4();
        let old = fx.initialize(passenger, 1, "txn-1").await.unwrap();

        let err = fx
            .engine
            .reschedule_booking(passenger, old.id, move_to(&fx, 1, "txn-2"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        fx.engine.cancel_booking(passenger, old.id).await.unwrap();
        let err = fx
            .engine
            .reschedule_booking(passenger, old.id, move_to(&fx, 2, "txn-3"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_resume_restores_when_replacement_never_confirmed() {
        let fx = Fixture::new().await;
        let passenger = Uuid::new_v4();
        let old = fx.initialize(passenger, 1, "txn-1").await.unwrap();
        fx.confirm("txn-1", "cus_1").await.unwrap();

        // Simulate a crash right after the old booking was parked.
        fx.store
            .stores()
            .ledger
            .transition(old.id, &[BookingStatus::Booked], &BookingUpdate::status(BookingStatus::Rescheduling))
            .await
            .unwrap();
        let parked = fx.engine.get_booking(passenger, old.id).await.unwrap();

        assert!(!fx.engine.resume_reschedule(&parked).await.unwrap());
        let restored = fx.engine.get_booking(passenger, old.id).await.unwrap();
        assert_eq!(restored.status, BookingStatus::Booked);
    }
}
