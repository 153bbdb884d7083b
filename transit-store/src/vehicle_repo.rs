use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use transit_catalog::{DeviceLease, Vehicle};
use transit_core::repository::VehicleStore;
use transit_core::CoreResult;
use uuid::Uuid;

use crate::database::map_sqlx;

pub struct StoreVehicleRepository {
    pool: PgPool,
}

impl StoreVehicleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    owner_id: Uuid,
    registration: String,
    name: String,
    approved: bool,
    machine_enabled: bool,
    is_leased: bool,
    lease_epoch: i64,
    created_at: DateTime<Utc>,
}

impl From<VehicleRow> for Vehicle {
    fn from(row: VehicleRow) -> Self {
        Vehicle {
            id: row.id,
            owner_id: row.owner_id,
            registration: row.registration,
            name: row.name,
            approved: row.approved,
            lease: DeviceLease {
                machine_enabled: row.machine_enabled,
                is_leased: row.is_leased,
                lease_epoch: row.lease_epoch,
            },
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl VehicleStore for StoreVehicleRepository {
    async fn create_vehicle(&self, vehicle: &Vehicle) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicles (id, owner_id, registration, name, approved, machine_enabled, is_leased, lease_epoch, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(vehicle.id)
        .bind(vehicle.owner_id)
        .bind(&vehicle.registration)
        .bind(&vehicle.name)
        .bind(vehicle.approved)
        .bind(vehicle.lease.machine_enabled)
        .bind(vehicle.lease.is_leased)
        .bind(vehicle.lease.lease_epoch)
        .bind(vehicle.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn get_vehicle(&self, vehicle_id: Uuid) -> CoreResult<Option<Vehicle>> {
        let row = sqlx::query_as::<_, VehicleRow>(
            r#"
            SELECT id, owner_id, registration, name, approved, machine_enabled, is_leased, lease_epoch, created_at
            FROM vehicles WHERE id = $1
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(Vehicle::from))
    }

    async fn acquire_lease(&self, vehicle_id: Uuid) -> CoreResult<Option<i64>> {
        let epoch: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE vehicles SET is_leased = TRUE
            WHERE id = $1 AND machine_enabled AND NOT is_leased
            RETURNING lease_epoch
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(epoch.map(|(e,)| e))
    }

    async fn release_lease(&self, vehicle_id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE vehicles
            SET is_leased = FALSE, machine_enabled = FALSE, lease_epoch = lease_epoch + 1
            WHERE id = $1
            "#,
        )
        .bind(vehicle_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_lease(&self, vehicle_id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE vehicles SET is_leased = FALSE, lease_epoch = lease_epoch + 1 WHERE id = $1",
        )
        .bind(vehicle_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn enable_machine(&self, vehicle_id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE vehicles
            SET machine_enabled = TRUE,
                lease_epoch = lease_epoch + CASE WHEN is_leased THEN 1 ELSE 0 END,
                is_leased = FALSE
            WHERE id = $1
            "#,
        )
        .bind(vehicle_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}
