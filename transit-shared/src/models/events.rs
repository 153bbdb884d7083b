use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of passenger notification emitted by the booking core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Booked,
    Rescheduled,
    Canceled,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Booked => "BOOKED",
            NotificationKind::Rescheduled => "RESCHEDULED",
            NotificationKind::Canceled => "CANCELED",
            NotificationKind::Error => "ERROR",
        }
    }
}

/// Fire-and-forget event keyed by passenger id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingNotification {
    pub passenger_id: Uuid,
    pub kind: NotificationKind,
    pub booking_id: Option<Uuid>,
    pub trip_id: Option<Uuid>,
    pub message: String,
    pub timestamp: i64,
}

impl BookingNotification {
    pub fn new(passenger_id: Uuid, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            passenger_id,
            kind,
            booking_id: None,
            trip_id: None,
            message: message.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn for_booking(mut self, booking_id: Uuid, trip_id: Uuid) -> Self {
        self.booking_id = Some(booking_id);
        self.trip_id = Some(trip_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_format() {
        let event = BookingNotification::new(Uuid::new_v4(), NotificationKind::Canceled, "Booking canceled");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "CANCELED");
        assert!(json["booking_id"].is_null());
        assert_eq!(NotificationKind::Rescheduled.as_str(), "RESCHEDULED");
    }
}
