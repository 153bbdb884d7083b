pub mod booking;
pub mod identity;
pub mod notification;
pub mod payment;
pub mod repository;

use transit_catalog::{InventoryError, LeaseError};
use uuid::Uuid;

pub use booking::{Booking, BookingStatus, BookingUpdate};
pub use identity::{DeviceCredential, IdentityResolver, Principal};
pub use notification::Notifier;
pub use payment::PaymentConfirmation;
pub use repository::Stores;

/// Coarse error class, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Seat {seat_number} on trip {trip_id} is no longer available")]
    SeatUnavailable { trip_id: Uuid, seat_number: i32 },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payment for booking {booking_id} was not applied, the booking is {status}")]
    PaymentNotApplied { booking_id: Uuid, status: BookingStatus },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::SeatUnavailable { .. } | CoreError::Conflict(_) | CoreError::PaymentNotApplied { .. } => {
                ErrorKind::Conflict
            }
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// True when the client should pick another seat rather than retry.
    pub fn is_seat_conflict(&self) -> bool {
        matches!(self, CoreError::SeatUnavailable { .. })
    }

    /// A settled payment reached a booking that had already closed without
    /// being confirmed. Needs a refund, never a silent acknowledgement.
    pub fn is_payment_not_applied(&self) -> bool {
        matches!(self, CoreError::PaymentNotApplied { .. })
    }

    pub fn from_inventory(trip_id: Uuid, err: InventoryError) -> Self {
        match err {
            InventoryError::SeatsNotFound(seats) => {
                CoreError::NotFound(format!("Seats {:?} not found on trip {}", seats, trip_id))
            }
            InventoryError::SeatUnavailable(seat_number) => CoreError::SeatUnavailable { trip_id, seat_number },
            InventoryError::ClaimMismatch { .. } | InventoryError::TripClosed(_) => CoreError::Conflict(err.to_string()),
            InventoryError::InvalidCapacity(_) | InventoryError::InvalidAmount(_) => {
                CoreError::InvalidArgument(err.to_string())
            }
        }
    }
}

impl From<LeaseError> for CoreError {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::MachineDisabled => CoreError::Forbidden(err.to_string()),
            LeaseError::AlreadyLeased => CoreError::Conflict(err.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_conflict_is_distinguishable() {
        let trip_id = Uuid::new_v4();
        let err = CoreError::from_inventory(trip_id, InventoryError::SeatUnavailable(4));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_seat_conflict());

        let generic = CoreError::Conflict("Booking already confirmed".into());
        assert_eq!(generic.kind(), ErrorKind::Conflict);
        assert!(!generic.is_seat_conflict());
    }

    #[test]
    fn test_unapplied_payment_is_not_a_plain_conflict() {
        let err = CoreError::PaymentNotApplied {
            booking_id: Uuid::new_v4(),
            status: BookingStatus::Abandoned,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_payment_not_applied());
        assert!(!err.is_seat_conflict());
        assert!(err.to_string().contains("Abandoned"));
        assert!(!CoreError::Conflict("Booking already Booked".into()).is_payment_not_applied());
    }

    #[test]
    fn test_lease_errors_map_to_taxonomy() {
        assert_eq!(CoreError::from(LeaseError::MachineDisabled).kind(), ErrorKind::Forbidden);
        assert_eq!(CoreError::from(LeaseError::AlreadyLeased).kind(), ErrorKind::Conflict);
    }
}
