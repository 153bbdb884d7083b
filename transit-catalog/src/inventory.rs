use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which booking occupies a seat and between which boarding points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatClaim {
    pub booking_id: Uuid,
    pub start_point: String,
    pub end_point: String,
}

impl SeatClaim {
    pub fn new(booking_id: Uuid, start_point: impl Into<String>, end_point: impl Into<String>) -> Self {
        Self {
            booking_id,
            start_point: start_point.into(),
            end_point: end_point.into(),
        }
    }
}

/// Occupancy of a single seat.
///
/// `Held` is the soft hold written by booking initialization and is not
/// counted in `booked_seats`. `Confirmed` is counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Free,
    Held(SeatClaim),
    Confirmed(SeatClaim),
}

impl SeatState {
    pub fn claim(&self) -> Option<&SeatClaim> {
        match self {
            SeatState::Free => None,
            SeatState::Held(claim) | SeatState::Confirmed(claim) => Some(claim),
        }
    }

    pub fn is_held_by(&self, booking_id: Uuid) -> bool {
        matches!(self, SeatState::Held(c) if c.booking_id == booking_id)
    }

    pub fn is_confirmed_for(&self, booking_id: Uuid) -> bool {
        matches!(self, SeatState::Confirmed(c) if c.booking_id == booking_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub seat_number: i32,
    pub state: SeatState,
}

impl Seat {
    pub fn is_free(&self) -> bool {
        self.state == SeatState::Free
    }

    pub fn is_booked(&self) -> bool {
        matches!(self.state, SeatState::Confirmed(_))
    }
}

/// Cash sale recorded by the on-board terminal. Not tied to a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashTicket {
    pub id: Uuid,
    pub start_point: String,
    pub end_point: String,
    pub ticket_price: i64,
    pub issued_at: DateTime<Utc>,
}

impl CashTicket {
    pub fn new(start_point: impl Into<String>, end_point: impl Into<String>, ticket_price: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_point: start_point.into(),
            end_point: end_point.into(),
            ticket_price,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAvailability {
    pub seat_number: i32,
    pub available: bool,
}

/// One scheduled run of a vehicle. Seat count is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub route_id: Uuid,
    pub route_name: String,
    pub vehicle_id: Uuid,
    pub departure: DateTime<Utc>,
    pub booking_price: i64,
    pub seats: Vec<Seat>,
    pub booked_seats: i32,
    pub booked_revenue: i64,
    pub tickets_revenue: i64,
    pub number_of_tickets: i32,
    pub tickets: Vec<CashTicket>,
    pub is_cancelled: bool,
    pub cancellation_fee_resolved: bool,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn schedule(
        route_id: Uuid,
        route_name: impl Into<String>,
        vehicle_id: Uuid,
        departure: DateTime<Utc>,
        booking_price: i64,
        capacity: i32,
    ) -> Result<Self, InventoryError> {
        if capacity < 1 {
            return Err(InventoryError::InvalidCapacity(capacity));
        }
        if booking_price < 0 {
            return Err(InventoryError::InvalidAmount(booking_price));
        }

        let seats = (1..=capacity)
            .map(|seat_number| Seat { seat_number, state: SeatState::Free })
            .collect();

        Ok(Self {
            id: Uuid::new_v4(),
            route_id,
            route_name: route_name.into(),
            vehicle_id,
            departure,
            booking_price,
            seats,
            booked_seats: 0,
            booked_revenue: 0,
            tickets_revenue: 0,
            number_of_tickets: 0,
            tickets: Vec::new(),
            is_cancelled: false,
            cancellation_fee_resolved: false,
            completed: false,
            created_at: Utc::now(),
        })
    }

    pub fn capacity(&self) -> i32 {
        self.seats.len() as i32
    }

    pub fn seat(&self, seat_number: i32) -> Option<&Seat> {
        self.seat_index(seat_number).map(|i| &self.seats[i])
    }

    // Seats are stored in order, so seat N lives at index N - 1.
    fn seat_index(&self, seat_number: i32) -> Option<usize> {
        if seat_number < 1 || seat_number > self.capacity() {
            return None;
        }
        Some((seat_number - 1) as usize)
    }

    /// Advisory read. The confirming write re-checks.
    pub fn availability(&self, seat_numbers: &[i32]) -> Result<Vec<SeatAvailability>, InventoryError> {
        let missing: Vec<i32> = seat_numbers
            .iter()
            .copied()
            .filter(|n| self.seat(*n).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(InventoryError::SeatsNotFound(missing));
        }

        Ok(seat_numbers
            .iter()
            .filter_map(|n| self.seat(*n))
            .map(|seat| SeatAvailability {
                seat_number: seat.seat_number,
                available: seat.is_free(),
            })
            .collect())
    }

    fn ensure_open(&self) -> Result<(), InventoryError> {
        if self.completed || self.is_cancelled {
            return Err(InventoryError::TripClosed(self.id));
        }
        Ok(())
    }

    /// Soft hold. Replaces an older hold, never a confirmed seat.
    pub fn hold(&mut self, seat_number: i32, claim: SeatClaim) -> Result<(), InventoryError> {
        self.ensure_open()?;
        let idx = self
            .seat_index(seat_number)
            .ok_or_else(|| InventoryError::SeatsNotFound(vec![seat_number]))?;

        let seat = &mut self.seats[idx];
        if seat.is_booked() {
            return Err(InventoryError::SeatUnavailable(seat_number));
        }
        seat.state = SeatState::Held(claim);
        Ok(())
    }

    /// The seat arbiter: succeeds only if the seat is free or held by the
    /// same booking. Counters move with the seat.
    pub fn confirm(&mut self, seat_number: i32, claim: SeatClaim, fare: i64) -> Result<(), InventoryError> {
        self.ensure_open()?;
        let idx = self
            .seat_index(seat_number)
            .ok_or_else(|| InventoryError::SeatsNotFound(vec![seat_number]))?;

        let seat = &mut self.seats[idx];
        let claimable = match &seat.state {
            SeatState::Free => true,
            SeatState::Held(held) => held.booking_id == claim.booking_id,
            SeatState::Confirmed(_) => false,
        };
        if !claimable {
            return Err(InventoryError::SeatUnavailable(seat_number));
        }
        let revenue = self
            .booked_revenue
            .checked_add(fare)
            .ok_or(InventoryError::InvalidAmount(fare))?;

        seat.state = SeatState::Confirmed(claim);
        self.booked_seats += 1;
        self.booked_revenue = revenue;
        Ok(())
    }

    /// Reverses `confirm` for the booking that owns the seat.
    pub fn release(&mut self, seat_number: i32, booking_id: Uuid, fare: i64) -> Result<(), InventoryError> {
        if self.completed {
            return Err(InventoryError::TripClosed(self.id));
        }
        let idx = self
            .seat_index(seat_number)
            .ok_or_else(|| InventoryError::SeatsNotFound(vec![seat_number]))?;

        let seat = &mut self.seats[idx];
        if !seat.state.is_confirmed_for(booking_id) {
            return Err(InventoryError::ClaimMismatch { seat_number, booking_id });
        }

        seat.state = SeatState::Free;
        self.booked_seats -= 1;
        self.booked_revenue -= fare;
        Ok(())
    }

    /// Drops a hold that was never confirmed.
    pub fn clear_hold(&mut self, seat_number: i32, booking_id: Uuid) -> Result<(), InventoryError> {
        let idx = self
            .seat_index(seat_number)
            .ok_or_else(|| InventoryError::SeatsNotFound(vec![seat_number]))?;

        let seat = &mut self.seats[idx];
        if !seat.state.is_held_by(booking_id) {
            return Err(InventoryError::ClaimMismatch { seat_number, booking_id });
        }
        seat.state = SeatState::Free;
        Ok(())
    }

    pub fn record_ticket(&mut self, ticket: CashTicket) -> Result<(), InventoryError> {
        self.ensure_open()?;
        if ticket.ticket_price < 0 {
            return Err(InventoryError::InvalidAmount(ticket.ticket_price));
        }
        self.tickets_revenue = self
            .tickets_revenue
            .checked_add(ticket.ticket_price)
            .ok_or(InventoryError::InvalidAmount(ticket.ticket_price))?;
        self.number_of_tickets += 1;
        self.tickets.push(ticket);
        Ok(())
    }

    /// Returns false if the trip was already completed.
    pub fn mark_completed(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        true
    }

    pub fn confirmed_count(&self) -> i32 {
        self.seats.iter().filter(|s| s.is_booked()).count() as i32
    }

    /// `booked_seats` must always match the number of confirmed seats.
    pub fn counters_consistent(&self) -> bool {
        self.booked_seats == self.confirmed_count()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Seats not found: {0:?}")]
    SeatsNotFound(Vec<i32>),

    #[error("Seat {0} is not available")]
    SeatUnavailable(i32),

    #[error("Seat {seat_number} is not claimed by booking {booking_id}")]
    ClaimMismatch { seat_number: i32, booking_id: Uuid },

    #[error("Trip {0} is closed")]
    TripClosed(Uuid),

    #[error("Number of seats must be at least 1, got {0}")]
    InvalidCapacity(i32),

    #[error("Amount {0} is negative or out of range")]
    InvalidAmount(i64),
}
