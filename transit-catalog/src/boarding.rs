use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named stop where a passenger boards or leaves the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardingPoint {
    pub id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl BoardingPoint {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            latitude,
            longitude,
        }
    }
}
