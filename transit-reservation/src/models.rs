use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use transit_catalog::CashTicket;
use transit_core::Booking;
use uuid::Uuid;

/// Owner request to put a vehicle on a route at a given time.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleTripRequest {
    pub vehicle_id: Uuid,
    pub route_id: Uuid,
    pub route_name: String,
    pub departure: DateTime<FixedOffset>,
    pub number_of_seats: i32,
    pub booking_price: i64,
}

/// Passenger request for a soft hold on one seat. `fee` is the base fee in
/// minor units; commission is added on top.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitializeBookingRequest {
    pub trip_id: Uuid,
    pub seat_number: i32,
    pub start_point_id: Uuid,
    pub end_point_id: Uuid,
    pub fee: i64,
    pub transaction_reference: String,
}

/// The replacement seat for a reschedule. Paid under its own transaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RescheduleRequest {
    pub trip_id: Uuid,
    pub seat_number: i32,
    pub start_point_id: Uuid,
    pub end_point_id: Uuid,
    pub fee: i64,
    pub transaction_reference: String,
}

impl RescheduleRequest {
    pub(crate) fn as_initialize(&self) -> InitializeBookingRequest {
        InitializeBookingRequest {
            trip_id: self.trip_id,
            seat_number: self.seat_number,
            start_point_id: self.start_point_id,
            end_point_id: self.end_point_id,
            fee: self.fee,
            transaction_reference: self.transaction_reference.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalkUpTicket {
    pub start_point_id: Uuid,
    pub end_point_id: Uuid,
    pub ticket_price: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordTicketsRequest {
    pub trip_id: Uuid,
    pub tickets: Vec<WalkUpTicket>,
}

/// A passenger's bookings grouped for display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BookingHistory {
    pub upcoming: Vec<Booking>,
    pub past: Vec<Booking>,
    pub cancelled: Vec<Booking>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripTickets {
    pub trip_id: Uuid,
    pub route_id: Uuid,
    pub booking_price: i64,
    pub tickets_revenue: i64,
    pub number_of_tickets: i32,
    pub tickets: Vec<CashTicket>,
}

/// Outcome of closing one trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CloseReport {
    pub trip_id: Uuid,
    pub completed: u64,
    pub failed: u64,
    pub already_closed: bool,
}

/// Counts from one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub rolled_forward: usize,
    pub abandoned: usize,
    pub reschedules_resumed: usize,
    pub departed_failed: usize,
    pub skipped: usize,
    pub ran_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_reject_unknown_fields() {
        let json = r#"{
            "trip_id": "6f1c1f34-5a53-4a5e-9b43-1d1f6f0e7c10",
            "seat_number": 3,
            "start_point_id": "a4c1a1f8-2a0b-4c33-bb6b-5a0f4b3f2e11",
            "end_point_id": "b5d2b2f9-3b1c-4d44-8c7c-6b1f5c4f3f22",
            "fee": 1000,
            "transaction_reference": "txn-1",
            "bus_name": "Express"
        }"#;
        assert!(serde_json::from_str::<InitializeBookingRequest>(json).is_err());
    }

    #[test]
    fn test_schedule_request_keeps_offset() {
        let json = r#"{
            "vehicle_id": "6f1c1f34-5a53-4a5e-9b43-1d1f6f0e7c10",
            "route_id": "a4c1a1f8-2a0b-4c33-bb6b-5a0f4b3f2e11",
            "route_name": "Kandy - Colombo",
            "departure": "2026-03-01T08:30:00+05:30",
            "number_of_seats": 40,
            "booking_price": 1000
        }"#;
        let req: ScheduleTripRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.departure.offset().local_minus_utc(), 19_800);
        assert_eq!(req.number_of_seats, 40);
    }
}
