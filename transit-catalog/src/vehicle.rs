use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Device lease state embedded in the vehicle record.
///
/// `lease_epoch` only ever grows. A device credential is valid while its
/// epoch equals the current one and the lease is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLease {
    pub machine_enabled: bool,
    pub is_leased: bool,
    pub lease_epoch: i64,
}

impl Default for DeviceLease {
    fn default() -> Self {
        Self {
            machine_enabled: false,
            is_leased: false,
            lease_epoch: 0,
        }
    }
}

impl DeviceLease {
    /// Returns the epoch the new credential is scoped to.
    pub fn acquire(&mut self) -> Result<i64, LeaseError> {
        if !self.machine_enabled {
            return Err(LeaseError::MachineDisabled);
        }
        if self.is_leased {
            return Err(LeaseError::AlreadyLeased);
        }
        self.is_leased = true;
        Ok(self.lease_epoch)
    }

    /// Operator logout. The only transition that turns the machine off.
    pub fn release(&mut self) {
        self.is_leased = false;
        self.machine_enabled = false;
        self.lease_epoch += 1;
    }

    pub fn revoke(&mut self) {
        self.is_leased = false;
        self.lease_epoch += 1;
    }

    /// Operator toggle "on". An outstanding lease is dropped and its epoch
    /// retired, so a later login cannot revive the old credential.
    pub fn enable(&mut self) {
        if self.is_leased {
            self.lease_epoch += 1;
        }
        self.machine_enabled = true;
        self.is_leased = false;
    }

    pub fn accepts(&self, epoch: i64) -> bool {
        self.is_leased && self.lease_epoch == epoch
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub registration: String,
    pub name: String,
    pub approved: bool,
    pub lease: DeviceLease,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn new(owner_id: Uuid, registration: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            registration: registration.into(),
            name: name.into(),
            approved: false,
            lease: DeviceLease::default(),
            created_at: Utc::now(),
        }
    }

    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("Machine is disabled. Contact your operator")]
    MachineDisabled,
    #[error("Another device is already connected")]
    AlreadyLeased,
}
