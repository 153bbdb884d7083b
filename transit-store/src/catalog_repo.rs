use async_trait::async_trait;
use sqlx::PgPool;
use transit_catalog::BoardingPoint;
use transit_core::repository::BoardingPointCatalog;
use transit_core::CoreResult;
use uuid::Uuid;

use crate::database::map_sqlx;

/// Read-only boarding point lookup.
pub struct StoreBoardingPointRepository {
    pool: PgPool,
}

impl StoreBoardingPointRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BoardingPointRow {
    id: Uuid,
    name: String,
    latitude: f64,
    longitude: f64,
}

#[async_trait]
impl BoardingPointCatalog for StoreBoardingPointRepository {
    async fn resolve(&self, point_id: Uuid) -> CoreResult<Option<BoardingPoint>> {
        let row = sqlx::query_as::<_, BoardingPointRow>(
            "SELECT id, name, latitude, longitude FROM boarding_points WHERE id = $1",
        )
        .bind(point_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(|r| BoardingPoint {
            id: r.id,
            name: r.name,
            latitude: r.latitude,
            longitude: r.longitude,
        }))
    }
}
