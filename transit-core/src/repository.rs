use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use transit_catalog::{BoardingPoint, CashTicket, SeatClaim, Trip, Vehicle};
use transit_shared::Masked;
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, BookingUpdate};
use crate::identity::DeviceCredential;
use crate::CoreResult;

/// Trip documents with their seat arrays and counters.
///
/// Every mutating method is a single conditional write. `Ok(false)` means
/// the predicate matched nothing and nothing changed.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn create_trip(&self, trip: &Trip) -> CoreResult<()>;

    async fn get_trip(&self, trip_id: Uuid) -> CoreResult<Option<Trip>>;

    /// Writes a soft hold unless the seat is confirmed or the trip is closed.
    async fn hold_seat(&self, trip_id: Uuid, seat_number: i32, claim: &SeatClaim) -> CoreResult<bool>;

    /// Free or held-by-this-booking becomes confirmed; `booked_seats += 1`
    /// and `booked_revenue += fare` in the same write.
    async fn confirm_seat(&self, trip_id: Uuid, seat_number: i32, claim: &SeatClaim, fare: i64) -> CoreResult<bool>;

    /// Confirmed-by-this-booking becomes free, counters decremented.
    async fn release_seat(&self, trip_id: Uuid, seat_number: i32, booking_id: Uuid, fare: i64) -> CoreResult<bool>;

    /// Held-by-this-booking becomes free.
    async fn clear_hold(&self, trip_id: Uuid, seat_number: i32, booking_id: Uuid) -> CoreResult<bool>;

    /// Appends a cash ticket only while the credential's epoch is current,
    /// the trip belongs to the credential's vehicle, and the trip is open.
    async fn append_ticket(&self, trip_id: Uuid, credential: &DeviceCredential, ticket: &CashTicket) -> CoreResult<bool>;

    /// Returns false if the trip was already completed.
    async fn mark_completed(&self, trip_id: Uuid) -> CoreResult<bool>;
}

#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Fails with `Conflict` on a duplicate transaction reference.
    async fn insert(&self, booking: &Booking) -> CoreResult<()>;

    async fn get(&self, booking_id: Uuid) -> CoreResult<Option<Booking>>;

    async fn find_by_transaction(&self, transaction_reference: &str) -> CoreResult<Option<Booking>>;

    /// Applies `update` only if the current status is one of `from`.
    async fn transition(&self, booking_id: Uuid, from: &[BookingStatus], update: &BookingUpdate) -> CoreResult<bool>;

    async fn set_proof(&self, booking_id: Uuid, proof: &str) -> CoreResult<()>;

    /// Bulk `from -> to` for one trip. Returns the number of rows moved.
    async fn transition_for_trip(&self, trip_id: Uuid, from: BookingStatus, to: BookingStatus) -> CoreResult<u64>;

    /// Bookings in `statuses` last touched before `cutoff`.
    async fn list_stale(&self, statuses: &[BookingStatus], cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>>;

    /// Bookings in `statuses` whose trip departed before `cutoff`.
    async fn list_departed(&self, statuses: &[BookingStatus], cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>>;

    async fn list_for_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>>;

    /// Bookings on `(trip, seat)` whose status holds the seat.
    async fn active_for_seat(&self, trip_id: Uuid, seat_number: i32) -> CoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait PassengerAccounts: Send + Sync {
    /// Adds the booking to the account, recording the customer reference
    /// if none is set. Fails with `InvalidArgument` if a different one is.
    /// `None` links without looking at the reference.
    async fn link_booking(
        &self,
        passenger_id: Uuid,
        booking_id: Uuid,
        customer_reference: Option<&Masked<String>>,
    ) -> CoreResult<()>;

    async fn unlink_booking(&self, passenger_id: Uuid, booking_id: Uuid) -> CoreResult<()>;

    async fn linked_bookings(&self, passenger_id: Uuid) -> CoreResult<Vec<Uuid>>;
}

/// Vehicle records and their embedded device lease.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn create_vehicle(&self, vehicle: &Vehicle) -> CoreResult<()>;

    async fn get_vehicle(&self, vehicle_id: Uuid) -> CoreResult<Option<Vehicle>>;

    /// `machine_enabled && !is_leased` becomes leased. Returns the epoch the
    /// credential is scoped to, or `None` if the predicate did not match.
    async fn acquire_lease(&self, vehicle_id: Uuid) -> CoreResult<Option<i64>>;

    /// Clears the lease, disables the machine and bumps the epoch.
    async fn release_lease(&self, vehicle_id: Uuid) -> CoreResult<bool>;

    /// Clears the lease and bumps the epoch.
    async fn revoke_lease(&self, vehicle_id: Uuid) -> CoreResult<bool>;

    async fn enable_machine(&self, vehicle_id: Uuid) -> CoreResult<bool>;
}

#[async_trait]
pub trait BoardingPointCatalog: Send + Sync {
    async fn resolve(&self, point_id: Uuid) -> CoreResult<Option<BoardingPoint>>;
}

/// The store handles the engine is built from.
#[derive(Clone)]
pub struct Stores {
    pub inventory: Arc<dyn InventoryStore>,
    pub ledger: Arc<dyn BookingLedger>,
    pub accounts: Arc<dyn PassengerAccounts>,
    pub vehicles: Arc<dyn VehicleStore>,
    pub boarding_points: Arc<dyn BoardingPointCatalog>,
}
