use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use transit_catalog::{BoardingPoint, FarePolicy, Trip, Vehicle};
use transit_core::repository::{InventoryStore, VehicleStore};
use transit_core::{Booking, CoreResult, Notifier, PaymentConfirmation};
use transit_shared::{BookingNotification, NotificationKind};
use transit_store::MemoryStore;
use uuid::Uuid;

use crate::fulfillment::ProofSigner;
use crate::manager::ReservationEngine;
use crate::models::{InitializeBookingRequest, ScheduleTripRequest};
use crate::reconciliation::{ReconciliationPolicy, TicketReconciler};

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<BookingNotification>>,
}

impl RecordingNotifier {
    pub async fn kinds(&self) -> Vec<NotificationKind> {
        self.events.lock().await.iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &BookingNotification) -> CoreResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// An approved, enabled vehicle with one open four-seat trip departing in
/// two days and two boarding points.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<ReservationEngine>,
    pub notifications: Arc<RecordingNotifier>,
    pub owner_id: Uuid,
    pub vehicle: Vehicle,
    pub trip: Trip,
    pub start: BoardingPoint,
    pub end: BoardingPoint,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let owner_id = Uuid::new_v4();

        let mut vehicle = Vehicle::new(owner_id, "NB-8421", "Dumindu Express").approved();
        vehicle.lease.machine_enabled = true;
        store.create_vehicle(&vehicle).await.unwrap();

        let trip = Trip::schedule(
            Uuid::new_v4(),
            "Kandy - Colombo",
            vehicle.id,
            Utc::now() + Duration::days(2),
            1_000,
            4,
        )
        .unwrap();
        store.create_trip(&trip).await.unwrap();

        let start = BoardingPoint::new("Kandy", 7.2906, 80.6337);
        let end = BoardingPoint::new("Colombo Fort", 6.9344, 79.8428);
        store.add_boarding_point(start.clone()).await;
        store.add_boarding_point(end.clone()).await;

        let notifications = Arc::new(RecordingNotifier::default());
        let engine = Arc::new(ReservationEngine::new(
            store.stores(),
            notifications.clone(),
            FarePolicy::default(),
            ProofSigner::new("test-proof-secret"),
        ));

        Self {
            store,
            engine,
            notifications,
            owner_id,
            vehicle,
            trip,
            start,
            end,
        }
    }

    pub fn request(&self, seat_number: i32, transaction_reference: &str) -> InitializeBookingRequest {
        InitializeBookingRequest {
            trip_id: self.trip.id,
            seat_number,
            start_point_id: self.start.id,
            end_point_id: self.end.id,
            fee: 1_000,
            transaction_reference: transaction_reference.to_string(),
        }
    }

    pub async fn initialize(&self, passenger_id: Uuid, seat_number: i32, txn: &str) -> CoreResult<Booking> {
        self.engine
            .initialize_booking(passenger_id, self.request(seat_number, txn))
            .await
    }

    pub async fn confirm(&self, txn: &str, customer: &str) -> CoreResult<Booking> {
        self.engine
            .confirm_booking(PaymentConfirmation::new(txn, customer))
            .await
    }

    pub fn schedule_request(&self, vehicle_id: Uuid, number_of_seats: i32) -> ScheduleTripRequest {
        ScheduleTripRequest {
            vehicle_id,
            route_id: Uuid::new_v4(),
            route_name: "Galle - Matara".into(),
            departure: (Utc::now() + Duration::days(1)).fixed_offset(),
            number_of_seats,
            booking_price: 1_000,
        }
    }

    pub fn reconciler(&self) -> TicketReconciler {
        TicketReconciler::new(
            self.engine.clone(),
            ReconciliationPolicy {
                pending_hold: Duration::minutes(15),
                grace: Duration::hours(6),
            },
        )
    }
}
