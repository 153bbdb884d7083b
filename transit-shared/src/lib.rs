pub mod pii;
pub mod models;
pub mod time;

pub use pii::Masked;
pub use models::events::{BookingNotification, NotificationKind};
pub use time::to_utc;
