use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use transit_catalog::{BoardingPoint, CashTicket, SeatClaim, Trip, Vehicle};
use transit_core::repository::{
    BoardingPointCatalog, BookingLedger, InventoryStore, PassengerAccounts, VehicleStore,
};
use transit_core::{Booking, BookingStatus, BookingUpdate, CoreError, CoreResult, DeviceCredential, Stores};
use transit_shared::Masked;
use uuid::Uuid;

#[derive(Default)]
struct Account {
    customer_reference: Option<String>,
    bookings: Vec<Uuid>,
}

#[derive(Default)]
struct State {
    trips: HashMap<Uuid, Trip>,
    bookings: HashMap<Uuid, Booking>,
    by_transaction: HashMap<String, Uuid>,
    accounts: HashMap<Uuid, Account>,
    vehicles: HashMap<Uuid, Vehicle>,
    boarding_points: HashMap<Uuid, BoardingPoint>,
}

/// Every port behind one lock. Each method takes the write lock once, so
/// each conditional write is atomic the same way a single SQL statement is.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            inventory: self.clone(),
            ledger: self.clone(),
            accounts: self.clone(),
            vehicles: self.clone(),
            boarding_points: self.clone(),
        }
    }

    pub async fn add_boarding_point(&self, point: BoardingPoint) {
        self.state.write().await.boarding_points.insert(point.id, point);
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn create_trip(&self, trip: &Trip) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.trips.contains_key(&trip.id) {
            return Err(CoreError::Conflict(format!("Trip {} already exists", trip.id)));
        }
        state.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_trip(&self, trip_id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.state.read().await.trips.get(&trip_id).cloned())
    }

    async fn hold_seat(&self, trip_id: Uuid, seat_number: i32, claim: &SeatClaim) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(match state.trips.get_mut(&trip_id) {
            Some(trip) => trip.hold(seat_number, claim.clone()).is_ok(),
            None => false,
        })
    }

    async fn confirm_seat(&self, trip_id: Uuid, seat_number: i32, claim: &SeatClaim, fare: i64) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(match state.trips.get_mut(&trip_id) {
            Some(trip) => trip.confirm(seat_number, claim.clone(), fare).is_ok(),
            None => false,
        })
    }

    async fn release_seat(&self, trip_id: Uuid, seat_number: i32, booking_id: Uuid, fare: i64) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(match state.trips.get_mut(&trip_id) {
            Some(trip) => trip.release(seat_number, booking_id, fare).is_ok(),
            None => false,
        })
    }

    async fn clear_hold(&self, trip_id: Uuid, seat_number: i32, booking_id: Uuid) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(match state.trips.get_mut(&trip_id) {
            Some(trip) => trip.clear_hold(seat_number, booking_id).is_ok(),
            None => false,
        })
    }

    async fn append_ticket(&self, trip_id: Uuid, credential: &DeviceCredential, ticket: &CashTicket) -> CoreResult<bool> {
        let mut state = self.state.write().await;

        let lease_current = state
            .vehicles
            .get(&credential.vehicle_id)
            .is_some_and(|v| v.lease.accepts(credential.lease_epoch));
        if !lease_current {
            return Ok(false);
        }

        Ok(match state.trips.get_mut(&trip_id) {
            Some(trip) if trip.vehicle_id == credential.vehicle_id => trip.record_ticket(ticket.clone()).is_ok(),
            _ => false,
        })
    }

    async fn mark_completed(&self, trip_id: Uuid) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.trips.get_mut(&trip_id).is_some_and(Trip::mark_completed))
    }
}

fn collect_sorted<F>(state: &State, filter: F) -> Vec<Booking>
where
    F: Fn(&Booking) -> bool,
{
    let mut bookings: Vec<Booking> = state.bookings.values().filter(|b| filter(b)).cloned().collect();
    bookings.sort_by_key(|b| b.created_at);
    bookings
}

#[async_trait]
impl BookingLedger for MemoryStore {
    async fn insert(&self, booking: &Booking) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.by_transaction.contains_key(&booking.transaction_reference) {
            return Err(CoreError::Conflict(format!(
                "Transaction {} already has a booking",
                booking.transaction_reference
            )));
        }
        state.by_transaction.insert(booking.transaction_reference.clone(), booking.id);
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.state.read().await.bookings.get(&booking_id).cloned())
    }

    async fn find_by_transaction(&self, transaction_reference: &str) -> CoreResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .by_transaction
            .get(transaction_reference)
            .and_then(|id| state.bookings.get(id))
            .cloned())
    }

    async fn transition(&self, booking_id: Uuid, from: &[BookingStatus], update: &BookingUpdate) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        match state.bookings.get_mut(&booking_id) {
            Some(booking) if from.contains(&booking.status) => {
                booking.apply(update);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_proof(&self, booking_id: Uuid, proof: &str) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", booking_id)))?;
        booking.proof_of_purchase = Some(proof.to_string());
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn transition_for_trip(&self, trip_id: Uuid, from: BookingStatus, to: BookingStatus) -> CoreResult<u64> {
        let mut state = self.state.write().await;
        let mut moved = 0;
        for booking in state.bookings.values_mut() {
            if booking.trip_id == trip_id && booking.status == from {
                booking.apply(&BookingUpdate::status(to));
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn list_stale(&self, statuses: &[BookingStatus], cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(collect_sorted(&state, |b| statuses.contains(&b.status) && b.updated_at < cutoff))
    }

    async fn list_departed(&self, statuses: &[BookingStatus], cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(collect_sorted(&state, |b| statuses.contains(&b.status) && b.trip_departure < cutoff))
    }

    async fn list_for_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        let mut bookings = collect_sorted(&state, |b| b.passenger_id == passenger_id);
        bookings.sort_by(|a, b| b.trip_departure.cmp(&a.trip_departure));
        Ok(bookings)
    }

    async fn active_for_seat(&self, trip_id: Uuid, seat_number: i32) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(collect_sorted(&state, |b| {
            b.trip_id == trip_id && b.seat_number == seat_number && b.status.holds_seat()
        }))
    }
}

#[async_trait]
impl PassengerAccounts for MemoryStore {
    async fn link_booking(
        &self,
        passenger_id: Uuid,
        booking_id: Uuid,
        customer_reference: Option<&Masked<String>>,
    ) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let account = state.accounts.entry(passenger_id).or_default();

        if let Some(reference) = customer_reference {
            match &account.customer_reference {
                Some(existing) if existing != reference.expose() => {
                    return Err(CoreError::InvalidArgument("Customer reference does not match".into()));
                }
                Some(_) => {}
                None => account.customer_reference = Some(reference.expose().clone()),
            }
        }

        if !account.bookings.contains(&booking_id) {
            account.bookings.push(booking_id);
        }
        Ok(())
    }

    async fn unlink_booking(&self, passenger_id: Uuid, booking_id: Uuid) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(account) = state.accounts.get_mut(&passenger_id) {
            account.bookings.retain(|id| *id != booking_id);
        }
        Ok(())
    }

    async fn linked_bookings(&self, passenger_id: Uuid) -> CoreResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .get(&passenger_id)
            .map(|a| a.bookings.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl VehicleStore for MemoryStore {
    async fn create_vehicle(&self, vehicle: &Vehicle) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.vehicles.values().any(|v| v.registration == vehicle.registration) {
            return Err(CoreError::Conflict(format!(
                "Vehicle {} already registered",
                vehicle.registration
            )));
        }
        state.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn get_vehicle(&self, vehicle_id: Uuid) -> CoreResult<Option<Vehicle>> {
        Ok(self.state.read().await.vehicles.get(&vehicle_id).cloned())
    }

    async fn acquire_lease(&self, vehicle_id: Uuid) -> CoreResult<Option<i64>> {
        let mut state = self.state.write().await;
        Ok(state
            .vehicles
            .get_mut(&vehicle_id)
            .and_then(|v| v.lease.acquire().ok()))
    }

    async fn release_lease(&self, vehicle_id: Uuid) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.vehicles.get_mut(&vehicle_id).map(|v| v.lease.release()).is_some())
    }

    async fn revoke_lease(&self, vehicle_id: Uuid) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.vehicles.get_mut(&vehicle_id).map(|v| v.lease.revoke()).is_some())
    }

    async fn enable_machine(&self, vehicle_id: Uuid) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.vehicles.get_mut(&vehicle_id).map(|v| v.lease.enable()).is_some())
    }
}

#[async_trait]
impl BoardingPointCatalog for MemoryStore {
    async fn resolve(&self, point_id: Uuid) -> CoreResult<Option<BoardingPoint>> {
        Ok(self.state.read().await.boarding_points.get(&point_id).cloned())
    }
}
