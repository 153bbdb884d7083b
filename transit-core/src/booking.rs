use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use transit_catalog::{Fare, SeatClaim};
use uuid::Uuid;

use crate::CoreError;

/// Booking lifecycle.
///
/// `Rescheduling` marks a booking whose replacement is in flight and
/// `Abandoned` marks a pending booking whose hold expired. Both are
/// resolved by the reconciliation sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    Pending,
    Booked,
    Verified,
    Completed,
    Failed,
    #[serde(rename = "Canceled_by_user")]
    CanceledByUser,
    #[serde(rename = "Rescheduled_1")]
    Rescheduled,
    Rescheduling,
    Abandoned,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Booked => "Booked",
            BookingStatus::Verified => "Verified",
            BookingStatus::Completed => "Completed",
            BookingStatus::Failed => "Failed",
            BookingStatus::CanceledByUser => "Canceled_by_user",
            BookingStatus::Rescheduled => "Rescheduled_1",
            BookingStatus::Rescheduling => "Rescheduling",
            BookingStatus::Abandoned => "Abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed
                | BookingStatus::Failed
                | BookingStatus::CanceledByUser
                | BookingStatus::Rescheduled
                | BookingStatus::Abandoned
        )
    }

    /// Statuses that hold a confirmed seat.
    pub fn holds_seat(&self) -> bool {
        matches!(
            self,
            BookingStatus::Booked | BookingStatus::Verified | BookingStatus::Rescheduling
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "Pending" => BookingStatus::Pending,
            "Booked" => BookingStatus::Booked,
            "Verified" => BookingStatus::Verified,
            "Completed" => BookingStatus::Completed,
            "Failed" => BookingStatus::Failed,
            "Canceled_by_user" => BookingStatus::CanceledByUser,
            "Rescheduled_1" => BookingStatus::Rescheduled,
            "Rescheduling" => BookingStatus::Rescheduling,
            "Abandoned" => BookingStatus::Abandoned,
            other => return Err(CoreError::InvalidArgument(format!("Unknown booking status: {}", other))),
        };
        Ok(status)
    }
}

/// A passenger's claim on one seat of one trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub vehicle_id: Uuid,
    pub seat_number: i32,
    pub passenger_id: Uuid,
    pub transaction_reference: String,
    pub fare: Fare,
    pub start_point_id: Uuid,
    pub end_point_id: Uuid,
    pub start_point: String,
    pub end_point: String,
    pub trip_departure: DateTime<Utc>,
    pub status: BookingStatus,
    pub proof_of_purchase: Option<String>,
    pub refund_amount: Option<i64>,
    pub refund_resolved: bool,
    /// Set on the old booking once a reschedule has produced its replacement.
    pub replaced_by: Option<Uuid>,
    pub replaces: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn claim(&self) -> SeatClaim {
        SeatClaim::new(self.id, self.start_point.clone(), self.end_point.clone())
    }

    pub fn apply(&mut self, update: &BookingUpdate) {
        self.status = update.status;
        if let Some(amount) = update.refund_amount {
            self.refund_amount = Some(amount);
        }
        if let Some(resolved) = update.refund_resolved {
            self.refund_resolved = resolved;
        }
        if let Some(replacement) = update.replaced_by {
            self.replaced_by = Some(replacement);
        }
        self.updated_at = Utc::now();
    }
}

/// Fields written by a conditional status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingUpdate {
    pub status: BookingStatus,
    pub refund_amount: Option<i64>,
    pub refund_resolved: Option<bool>,
    pub replaced_by: Option<Uuid>,
}

impl BookingUpdate {
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status,
            refund_amount: None,
            refund_resolved: None,
            replaced_by: None,
        }
    }

    pub fn with_refund(mut self, amount: i64) -> Self {
        self.refund_amount = Some(amount);
        self.refund_resolved = Some(false);
        self
    }

    pub fn replaced_by(mut self, booking_id: Uuid) -> Self {
        self.replaced_by = Some(booking_id);
        self
    }
}
