use tracing::{info, warn};
use transit_catalog::CashTicket;
use transit_core::{Booking, BookingStatus, BookingUpdate, CoreError, CoreResult, DeviceCredential};
use uuid::Uuid;

use crate::fulfillment::ProofPayload;
use crate::manager::ReservationEngine;
use crate::models::{RecordTicketsRequest, WalkUpTicket};

impl ReservationEngine {
    /// Appends one cash sale. The store re-checks the credential's epoch in
    /// the same write, so a revoked terminal cannot slip a ticket in.
    pub async fn record_walk_up_ticket(
        &self,
        credential: &DeviceCredential,
        trip_id: Uuid,
        ticket: &WalkUpTicket,
    ) -> CoreResult<CashTicket> {
        self.leases.authorize(credential).await?;

        if ticket.ticket_price < 0 {
            return Err(CoreError::InvalidArgument(format!(
                "ticket_price must not be negative, got {}",
                ticket.ticket_price
            )));
        }
        let start = self.boarding_point_name(ticket.start_point_id).await?;
        let end = self.boarding_point_name(ticket.end_point_id).await?;
        let cash = CashTicket::new(start, end, ticket.ticket_price);

        if self
            .stores
            .inventory
            .append_ticket(trip_id, credential, &cash)
            .await?
        {
            info!("Recorded walk-up ticket {} on trip {}", cash.id, trip_id);
            return Ok(cash);
        }

        Err(self.explain_rejected_ticket(credential, trip_id).await)
    }

    pub async fn record_walk_up_tickets(
        &self,
        credential: &DeviceCredential,
        req: RecordTicketsRequest,
    ) -> CoreResult<Vec<CashTicket>> {
        if req.tickets.is_empty() {
            return Err(CoreError::InvalidArgument("tickets must not be empty".into()));
        }
        let mut recorded = Vec::with_capacity(req.tickets.len());
        for ticket in &req.tickets {
            recorded.push(self.record_walk_up_ticket(credential, req.trip_id, ticket).await?);
        }
        Ok(recorded)
    }

    async fn boarding_point_name(&self, point_id: Uuid) -> CoreResult<String> {
        self.stores
            .boarding_points
            .resolve(point_id)
            .await?
            .map(|p| p.name)
            .ok_or_else(|| CoreError::NotFound(format!("Boarding point {} not found", point_id)))
    }

    // The append matched nothing; work out which predicate failed.
    async fn explain_rejected_ticket(&self, credential: &DeviceCredential, trip_id: Uuid) -> CoreError {
        if let Err(e) = self.leases.authorize(credential).await {
            return e;
        }
        match self.stores.inventory.get_trip(trip_id).await {
            Err(e) => e,
            Ok(None) => CoreError::NotFound(format!("Trip {} not found", trip_id)),
            Ok(Some(trip)) if trip.vehicle_id != credential.vehicle_id => {
                warn!(
                    "Vehicle {} tried to record a ticket on trip {} of vehicle {}",
                    credential.vehicle_id, trip_id, trip.vehicle_id
                );
                CoreError::Forbidden(format!("Trip {} belongs to another vehicle", trip_id))
            }
            Ok(Some(_)) => CoreError::Conflict(format!("Trip {} is closed", trip_id)),
        }
    }

    /// On-board check of a passenger's booking: `Booked` becomes `Verified`.
    pub async fn verify_booking(
        &self,
        credential: &DeviceCredential,
        booking_id: Uuid,
        passenger_id: Uuid,
    ) -> CoreResult<Booking> {
        self.leases.authorize(credential).await?;

        let mut booking = self
            .stores
            .ledger
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", booking_id)))?;

        if booking.vehicle_id != credential.vehicle_id {
            return Err(CoreError::Forbidden(format!("Booking {} is for another vehicle", booking_id)));
        }
        if booking.passenger_id != passenger_id {
            return Err(CoreError::Forbidden(format!("Booking {} belongs to another passenger", booking_id)));
        }
        if booking.status != BookingStatus::Booked {
            return Err(CoreError::Conflict(format!("Booking {} is {}", booking_id, booking.status)));
        }

        let update = BookingUpdate::status(BookingStatus::Verified);
        if !self
            .stores
            .ledger
            .transition(booking.id, &[BookingStatus::Booked], &update)
            .await?
        {
            return Err(CoreError::Conflict(format!("Booking {} changed concurrently", booking_id)));
        }
        booking.apply(&update);
        info!("Booking {} verified on vehicle {}", booking_id, credential.vehicle_id);
        Ok(booking)
    }

    /// Verifies a scanned proof-of-purchase token.
    pub async fn verify_proof(&self, credential: &DeviceCredential, token: &str) -> CoreResult<Booking> {
        let ProofPayload {
            booking_id,
            passenger_id,
        } = self.proofs.verify(token)?;
        self.verify_booking(credential, booking_id, passenger_id).await
    }
}
