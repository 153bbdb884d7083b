use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// What a device login yields: the vehicle it acts for and the lease epoch
/// it was minted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredential {
    pub vehicle_id: Uuid,
    pub lease_epoch: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Passenger(Uuid),
    Owner(Uuid),
    Device(DeviceCredential),
}

impl Principal {
    pub fn role(&self) -> &'static str {
        match self {
            Principal::Passenger(_) => "PASSENGER",
            Principal::Owner(_) => "OWNER",
            Principal::Device(_) => "DEVICE",
        }
    }
}

/// Turns a bearer credential into a principal. Implementations fail with
/// `Unauthorized`; callers never look inside the credential.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, bearer: &str) -> CoreResult<Principal>;
}
