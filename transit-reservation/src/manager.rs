use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use transit_catalog::{BoardingPoint, FarePolicy, SeatAvailability, Trip};
use transit_core::{
    Booking, BookingStatus, BookingUpdate, CoreError, CoreResult, Notifier, PaymentConfirmation, Stores,
};
use transit_shared::{to_utc, BookingNotification, Masked, NotificationKind};
use uuid::Uuid;

use crate::fulfillment::ProofSigner;
use crate::lease::DeviceLeaseManager;
use crate::models::{BookingHistory, InitializeBookingRequest, ScheduleTripRequest, TripTickets};

/// Bookings whose trip left more than this long ago count as past even
/// while still `Booked`.
const HISTORY_CUTOFF_HOURS: i64 = 24;

/// The booking state machine.
///
/// Holds no seat state of its own. Every contended decision is one
/// conditional write in the inventory store, so any number of engines may
/// run against the same store.
pub struct ReservationEngine {
    pub(crate) stores: Stores,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) pricing: FarePolicy,
    pub(crate) proofs: ProofSigner,
    pub(crate) leases: DeviceLeaseManager,
}

impl ReservationEngine {
    pub fn new(stores: Stores, notifier: Arc<dyn Notifier>, pricing: FarePolicy, proofs: ProofSigner) -> Self {
        let leases = DeviceLeaseManager::new(stores.vehicles.clone());
        Self {
            stores,
            notifier,
            pricing,
            proofs,
            leases,
        }
    }

    pub fn leases(&self) -> &DeviceLeaseManager {
        &self.leases
    }

    pub fn proofs(&self) -> &ProofSigner {
        &self.proofs
    }

    pub fn pricing(&self) -> FarePolicy {
        self.pricing
    }

    pub async fn schedule_trip(&self, owner_id: Uuid, req: ScheduleTripRequest) -> CoreResult<Trip> {
        if req.route_name.trim().is_empty() {
            return Err(CoreError::InvalidArgument("route_name is required".into()));
        }
        let vehicle = self.leases.ensure_owner(owner_id, req.vehicle_id).await?;
        if !vehicle.approved {
            return Err(CoreError::Forbidden(format!("Vehicle {} is not approved", vehicle.id)));
        }

        let trip = Trip::schedule(
            req.route_id,
            req.route_name,
            vehicle.id,
            to_utc(req.departure),
            req.booking_price,
            req.number_of_seats,
        )
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;

        self.stores.inventory.create_trip(&trip).await?;
        info!(
            "Scheduled trip {} for vehicle {} with {} seats",
            trip.id,
            trip.vehicle_id,
            trip.capacity()
        );
        Ok(trip)
    }

    pub async fn trip(&self, trip_id: Uuid) -> CoreResult<Trip> {
        self.stores
            .inventory
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Trip {} not found", trip_id)))
    }

    /// Advisory only. The confirming write is the arbiter.
    pub async fn check_availability(&self, trip_id: Uuid, seat_numbers: &[i32]) -> CoreResult<Vec<SeatAvailability>> {
        if seat_numbers.is_empty() {
            return Err(CoreError::InvalidArgument("seat_numbers must not be empty".into()));
        }
        let trip = self.trip(trip_id).await?;
        trip.availability(seat_numbers)
            .map_err(|e| CoreError::from_inventory(trip_id, e))
    }

    async fn boarding_point(&self, point_id: Uuid) -> CoreResult<BoardingPoint> {
        self.stores
            .boarding_points
            .resolve(point_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Boarding point {} not found", point_id)))
    }

    /// Persists a `Pending` booking, then writes the soft hold. A failed
    /// hold leaves the booking orphaned for the sweep to abandon.
    pub async fn initialize_booking(&self, passenger_id: Uuid, req: InitializeBookingRequest) -> CoreResult<Booking> {
        self.initialize(passenger_id, &req, None).await
    }

    pub(crate) async fn initialize(
        &self,
        passenger_id: Uuid,
        req: &InitializeBookingRequest,
        replaces: Option<Uuid>,
    ) -> CoreResult<Booking> {
        if req.transaction_reference.trim().is_empty() {
            return Err(CoreError::InvalidArgument("transaction_reference is required".into()));
        }
        if req.start_point_id == req.end_point_id {
            return Err(CoreError::InvalidArgument("start and end boarding points must differ".into()));
        }
        let fare = self
            .pricing
            .quote(req.fee)
            .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;

        let trip = self.trip(req.trip_id).await?;
        if trip.seat(req.seat_number).is_none() {
            return Err(CoreError::NotFound(format!(
                "Seat {} not found on trip {}",
                req.seat_number, trip.id
            )));
        }
        if trip.completed || trip.is_cancelled {
            return Err(CoreError::Conflict(format!("Trip {} is closed", trip.id)));
        }

        let start = self.boarding_point(req.start_point_id).await?;
        let end = self.boarding_point(req.end_point_id).await?;

        let now = Utc::now();
        let mut booking = Booking {
            id: Uuid::new_v4(),
            trip_id: trip.id,
            vehicle_id: trip.vehicle_id,
            seat_number: req.seat_number,
            passenger_id,
            transaction_reference: req.transaction_reference.trim().to_string(),
            fare,
            start_point_id: start.id,
            end_point_id: end.id,
            start_point: start.name,
            end_point: end.name,
            trip_departure: trip.departure,
            status: BookingStatus::Pending,
            proof_of_purchase: None,
            refund_amount: None,
            refund_resolved: false,
            replaced_by: None,
            replaces,
            created_at: now,
            updated_at: now,
        };

        self.stores.ledger.insert(&booking).await?;

        let held = self
            .stores
            .inventory
            .hold_seat(trip.id, booking.seat_number, &booking.claim())
            .await?;
        if !held {
            warn!(
                "Hold failed for booking {} on trip {} seat {}",
                booking.id, trip.id, booking.seat_number
            );
            return Err(CoreError::SeatUnavailable {
                trip_id: trip.id,
                seat_number: booking.seat_number,
            });
        }

        let proof = self.proofs.sign(booking.id, passenger_id)?;
        self.stores.ledger.set_proof(booking.id, &proof).await?;
        booking.proof_of_purchase = Some(proof);

        info!(
            "Initialized booking {} for seat {} on trip {}",
            booking.id, booking.seat_number, trip.id
        );
        Ok(booking)
    }

    /// Payment callback. Idempotent on the transaction reference: a second
    /// delivery finds the booking already confirmed and gets `Conflict`.
    /// A payment for a booking that closed unconfirmed gets
    /// `PaymentNotApplied` and an `Error` notification.
    pub async fn confirm_booking(&self, confirmation: PaymentConfirmation) -> CoreResult<Booking> {
        confirmation.validate()?;
        let reference = confirmation.transaction_reference.trim();

        let booking = self
            .stores
            .ledger
            .find_by_transaction(reference)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("No booking for transaction {}", reference)))?;

        match booking.status {
            BookingStatus::Pending => {}
            status if already_paid(&booking) => {
                if matches!(status, BookingStatus::Booked | BookingStatus::Verified) {
                    // A retry also restores a link lost after the status write.
                    self.stores
                        .accounts
                        .link_booking(booking.passenger_id, booking.id, Some(&confirmation.customer_reference))
                        .await?;
                }
                return Err(CoreError::Conflict(format!("Booking {} is already {}", booking.id, status)));
            }
            _ => return Err(self.payment_not_applied(&booking).await),
        }

        let booking = self
            .confirm_pending(booking, Some(&confirmation.customer_reference))
            .await?;
        self.notify(
            BookingNotification::new(booking.passenger_id, NotificationKind::Booked, "Your seat is booked")
                .for_booking(booking.id, booking.trip_id),
        )
        .await;
        Ok(booking)
    }

    async fn payment_not_applied(&self, booking: &Booking) -> CoreError {
        error!(
            "Payment {} arrived for booking {} after it became {}",
            booking.transaction_reference, booking.id, booking.status
        );
        self.notify(
            BookingNotification::new(
                booking.passenger_id,
                NotificationKind::Error,
                "Your payment arrived after the booking closed and was not applied",
            )
            .for_booking(booking.id, booking.trip_id),
        )
        .await;
        CoreError::PaymentNotApplied {
            booking_id: booking.id,
            status: booking.status,
        }
    }

    /// Seat write, then the status write, then the account link. Nothing is
    /// linked unless the booking ends up confirmed.
    pub(crate) async fn confirm_pending(
        &self,
        mut booking: Booking,
        customer_reference: Option<&Masked<String>>,
    ) -> CoreResult<Booking> {
        let confirmed = self
            .stores
            .inventory
            .confirm_seat(booking.trip_id, booking.seat_number, &booking.claim(), booking.fare.base_fee)
            .await?;

        if !confirmed {
            let trip = self.trip(booking.trip_id).await?;
            let seat_is_ours = trip
                .seat(booking.seat_number)
                .is_some_and(|s| s.state.is_confirmed_for(booking.id));
            if seat_is_ours {
                return Err(CoreError::Conflict(format!("Booking {} is already confirmed", booking.id)));
            }

            warn!(
                "Booking {} lost seat {} on trip {}",
                booking.id, booking.seat_number, booking.trip_id
            );
            self.notify(
                BookingNotification::new(
                    booking.passenger_id,
                    NotificationKind::Error,
                    "The selected seat is no longer available",
                )
                .for_booking(booking.id, booking.trip_id),
            )
            .await;
            return Err(CoreError::SeatUnavailable {
                trip_id: booking.trip_id,
                seat_number: booking.seat_number,
            });
        }

        let update = BookingUpdate::status(BookingStatus::Booked);
        let booking = if self
            .stores
            .ledger
            .transition(booking.id, &[BookingStatus::Pending], &update)
            .await?
        {
            booking.apply(&update);
            info!("Booking {} confirmed on trip {}", booking.id, booking.trip_id);
            booking
        } else {
            // Status moved under us. The sweep may already have rolled it forward.
            let current = self
                .stores
                .ledger
                .get(booking.id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", booking.id)))?;
            if !matches!(current.status, BookingStatus::Booked | BookingStatus::Verified) {
                error!(
                    "Booking {} became {} during confirmation; releasing seat {}",
                    booking.id, current.status, booking.seat_number
                );
                self.stores
                    .inventory
                    .release_seat(booking.trip_id, booking.seat_number, booking.id, booking.fare.base_fee)
                    .await?;
                return Err(self.payment_not_applied(&current).await);
            }
            current
        };

        self.stores
            .accounts
            .link_booking(booking.passenger_id, booking.id, customer_reference)
            .await?;
        Ok(booking)
    }

    /// Releases the seat of a confirmed booking or drops the hold of a
    /// pending one. Refunds apply to confirmed bookings only.
    pub async fn cancel_booking(&self, passenger_id: Uuid, booking_id: Uuid) -> CoreResult<Booking> {
        let mut booking = self.get_booking(passenger_id, booking_id).await?;

        match booking.status {
            BookingStatus::Pending => {
                let update = BookingUpdate::status(BookingStatus::CanceledByUser);
                if !self
                    .stores
                    .ledger
                    .transition(booking.id, &[BookingStatus::Pending], &update)
                    .await?
                {
                    return Err(CoreError::Conflict(format!("Booking {} changed concurrently", booking.id)));
                }
                self.stores
                    .inventory
                    .clear_hold(booking.trip_id, booking.seat_number, booking.id)
                    .await?;
                booking.apply(&update);
            }
            BookingStatus::Booked | BookingStatus::Verified => {
                let trip = self.trip(booking.trip_id).await?;
                if trip.completed {
                    return Err(CoreError::Conflict(format!("Trip {} is already completed", trip.id)));
                }

                let refund = self.pricing.refund_for(&booking.fare);
                let update = BookingUpdate::status(BookingStatus::CanceledByUser).with_refund(refund);
                if !self
                    .stores
                    .ledger
                    .transition(booking.id, &[BookingStatus::Booked, BookingStatus::Verified], &update)
                    .await?
                {
                    return Err(CoreError::Conflict(format!("Booking {} changed concurrently", booking.id)));
                }

                let released = self
                    .stores
                    .inventory
                    .release_seat(booking.trip_id, booking.seat_number, booking.id, booking.fare.base_fee)
                    .await?;
                if !released {
                    error!(
                        "Booking {} cancelled but seat {} on trip {} was not confirmed for it",
                        booking.id, booking.seat_number, booking.trip_id
                    );
                }
                booking.apply(&update);
            }
            other => {
                return Err(CoreError::Conflict(format!(
                    "Booking {} cannot be cancelled while {}",
                    booking.id, other
                )))
            }
        }

        self.stores.accounts.unlink_booking(booking.passenger_id, booking.id).await?;
        info!("Booking {} cancelled, refund {:?}", booking.id, booking.refund_amount);
        self.notify(
            BookingNotification::new(booking.passenger_id, NotificationKind::Canceled, "Your booking was cancelled")
                .for_booking(booking.id, booking.trip_id),
        )
        .await;
        Ok(booking)
    }

    /// Lets a client discover the outcome of a request it lost track of.
    pub async fn get_booking(&self, passenger_id: Uuid, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self
            .stores
            .ledger
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", booking_id)))?;
        if booking.passenger_id != passenger_id {
            return Err(CoreError::Forbidden(format!("Booking {} belongs to another passenger", booking_id)));
        }
        Ok(booking)
    }

    pub async fn bookings_for_passenger(&self, passenger_id: Uuid) -> CoreResult<BookingHistory> {
        let bookings = self.stores.ledger.list_for_passenger(passenger_id).await?;
        Ok(partition_history(bookings, Utc::now()))
    }

    pub async fn trip_tickets(&self, owner_id: Uuid, trip_id: Uuid) -> CoreResult<TripTickets> {
        let trip = self.trip(trip_id).await?;
        self.leases.ensure_owner(owner_id, trip.vehicle_id).await?;
        Ok(TripTickets {
            trip_id: trip.id,
            route_id: trip.route_id,
            booking_price: trip.booking_price,
            tickets_revenue: trip.tickets_revenue,
            number_of_tickets: trip.number_of_tickets,
            tickets: trip.tickets,
        })
    }

    pub(crate) async fn notify(&self, event: BookingNotification) {
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(
                "Dropped {} notification for passenger {}: {}",
                event.kind.as_str(),
                event.passenger_id,
                e
            );
        }
    }
}

/// Whether a booking's payment was already taken into account. Only a
/// confirmed booking earns a refund on cancellation.
fn already_paid(booking: &Booking) -> bool {
    match booking.status {
        BookingStatus::Booked | BookingStatus::Verified | BookingStatus::Completed => true,
        BookingStatus::CanceledByUser => booking.refund_amount.is_some(),
        _ => false,
    }
}

fn partition_history(bookings: Vec<Booking>, now: DateTime<Utc>) -> BookingHistory {
    let cutoff = now - Duration::hours(HISTORY_CUTOFF_HOURS);
    let mut history = BookingHistory::default();

    for booking in bookings {
        match booking.status {
            BookingStatus::CanceledByUser | BookingStatus::Abandoned => history.cancelled.push(booking),
            BookingStatus::Pending | BookingStatus::Booked | BookingStatus::Rescheduling
                if booking.trip_departure >= cutoff =>
            {
                history.upcoming.push(booking)
            }
            _ => history.past.push(booking),
        }
    }
    history
}
