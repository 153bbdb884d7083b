pub mod boarding;
pub mod inventory;
pub mod pricing;
pub mod vehicle;

pub use boarding::BoardingPoint;
pub use inventory::{CashTicket, InventoryError, Seat, SeatAvailability, SeatClaim, SeatState, Trip};
pub use pricing::{Fare, FarePolicy};
pub use vehicle::{DeviceLease, LeaseError, Vehicle};
