pub mod models;
pub mod manager;
pub mod changes;
pub mod tickets;
pub mod lease;
pub mod fulfillment;
pub mod reconciliation;

pub use models::{
    BookingHistory, CloseReport, InitializeBookingRequest, RecordTicketsRequest, RescheduleRequest,
    ScheduleTripRequest, SweepReport, TripTickets, WalkUpTicket,
};
pub use manager::ReservationEngine;
pub use lease::DeviceLeaseManager;
pub use fulfillment::{ProofPayload, ProofSigner};
pub use reconciliation::{ReconciliationPolicy, TicketReconciler};

#[cfg(test)]
pub(crate) mod testing;
