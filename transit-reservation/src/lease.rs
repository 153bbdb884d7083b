use std::sync::Arc;
use tracing::{info, warn};
use transit_catalog::Vehicle;
use transit_core::repository::VehicleStore;
use transit_core::{CoreError, CoreResult, DeviceCredential, Principal};
use uuid::Uuid;

/// Grants and withdraws the right for one terminal to act for a vehicle.
///
/// Acquisition is a single conditional write on the vehicle record; every
/// device write is later checked against the epoch minted here.
#[derive(Clone)]
pub struct DeviceLeaseManager {
    vehicles: Arc<dyn VehicleStore>,
}

impl DeviceLeaseManager {
    pub fn new(vehicles: Arc<dyn VehicleStore>) -> Self {
        Self { vehicles }
    }

    async fn load(&self, vehicle_id: Uuid) -> CoreResult<Vehicle> {
        self.vehicles
            .get_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Vehicle {} not found", vehicle_id)))
    }

    pub async fn acquire(&self, vehicle_id: Uuid) -> CoreResult<DeviceCredential> {
        if let Some(lease_epoch) = self.vehicles.acquire_lease(vehicle_id).await? {
            info!("Lease acquired for vehicle {} at epoch {}", vehicle_id, lease_epoch);
            return Ok(DeviceCredential { vehicle_id, lease_epoch });
        }

        // The write did not match. Re-read only to report why.
        let vehicle = self.load(vehicle_id).await?;
        let mut lease = vehicle.lease;
        match lease.acquire() {
            Err(e) => {
                warn!("Lease refused for vehicle {}: {}", vehicle_id, e);
                Err(e.into())
            }
            Ok(_) => Err(CoreError::Conflict(format!(
                "Lease for vehicle {} changed concurrently",
                vehicle_id
            ))),
        }
    }

    /// Owner logout, or the device logging itself out.
    pub async fn release(&self, principal: &Principal, vehicle_id: Uuid) -> CoreResult<()> {
        match principal {
            Principal::Owner(owner_id) => {
                self.ensure_owner(*owner_id, vehicle_id).await?;
            }
            Principal::Device(credential) if credential.vehicle_id == vehicle_id => {
                self.authorize(credential).await?;
            }
            _ => {
                return Err(CoreError::Forbidden(format!(
                    "Not allowed to release the lease on vehicle {}",
                    vehicle_id
                )))
            }
        }

        if !self.vehicles.release_lease(vehicle_id).await? {
            return Err(CoreError::NotFound(format!("Vehicle {} not found", vehicle_id)));
        }
        info!("Lease released for vehicle {}, machine disabled", vehicle_id);
        Ok(())
    }

    pub async fn force_revoke(&self, owner_id: Uuid, vehicle_id: Uuid) -> CoreResult<()> {
        self.ensure_owner(owner_id, vehicle_id).await?;
        if !self.vehicles.revoke_lease(vehicle_id).await? {
            return Err(CoreError::NotFound(format!("Vehicle {} not found", vehicle_id)));
        }
        warn!("Lease force-revoked for vehicle {}", vehicle_id);
        Ok(())
    }

    pub async fn enable_machine(&self, owner_id: Uuid, vehicle_id: Uuid) -> CoreResult<()> {
        self.ensure_owner(owner_id, vehicle_id).await?;
        if !self.vehicles.enable_machine(vehicle_id).await? {
            return Err(CoreError::NotFound(format!("Vehicle {} not found", vehicle_id)));
        }
        info!("Machine enabled for vehicle {}", vehicle_id);
        Ok(())
    }

    /// Checks a device credential against the vehicle's current lease.
    /// A stale epoch fails closed.
    pub async fn authorize(&self, credential: &DeviceCredential) -> CoreResult<Vehicle> {
        let vehicle = self
            .vehicles
            .get_vehicle(credential.vehicle_id)
            .await?
            .ok_or_else(|| CoreError::Unauthorized("Unknown vehicle".into()))?;

        if !vehicle.lease.accepts(credential.lease_epoch) {
            warn!(
                "Rejected device credential for vehicle {} (epoch {}, current {})",
                credential.vehicle_id, credential.lease_epoch, vehicle.lease.lease_epoch
            );
            return Err(CoreError::Unauthorized("Device lease is no longer valid".into()));
        }
        Ok(vehicle)
    }

    pub async fn ensure_owner(&self, owner_id: Uuid, vehicle_id: Uuid) -> CoreResult<Vehicle> {
        let vehicle = self.load(vehicle_id).await?;
        if vehicle.owner_id != owner_id {
            return Err(CoreError::Forbidden(format!("Vehicle {} belongs to another owner", vehicle_id)));
        }
        Ok(vehicle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use transit_core::ErrorKind;

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let fx = Fixture::new().await;
        let leases = fx.engine.leases();

        let credential = leases.acquire(fx.vehicle.id).await.unwrap();
        assert_eq!(credential.lease_epoch, 0);

        let err = leases.acquire(fx.vehicle.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_disabled_machine_is_forbidden() {
        let fx = Fixture::new().await;
        let leases = fx.engine.leases();
        leases.release(&Principal::Owner(fx.owner_id), fx.vehicle.id).await.unwrap();

        let err = leases.acquire(fx.vehicle.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = leases.acquire(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_release_and_revoke_retire_credential() {
        let fx = Fixture::new().await;
        let leases = fx.engine.leases();

        let first = leases.acquire(fx.vehicle.id).await.unwrap();
        leases.force_revoke(fx.owner_id, fx.vehicle.id).await.unwrap();
        let err = leases.authorize(&first).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let second = leases.acquire(fx.vehicle.id).await.unwrap();
        assert_eq!(second.lease_epoch, first.lease_epoch + 1);
        leases.release(&Principal::Device(second), fx.vehicle.id).await.unwrap();
        assert!(leases.authorize(&second).await.is_err());
    }

    #[tokio::test]
    async fn test_other_owner_cannot_manage_vehicle() {
        let fx = Fixture::new().await;
        let leases = fx.engine.leases();
        let err = leases.force_revoke(Uuid::new_v4(), fx.vehicle.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = leases
            .release(&Principal::Passenger(Uuid::new_v4()), fx.vehicle.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
