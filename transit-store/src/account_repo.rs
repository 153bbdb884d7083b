use async_trait::async_trait;
use sqlx::PgPool;
use transit_core::repository::PassengerAccounts;
use transit_core::{CoreError, CoreResult};
use transit_shared::Masked;
use uuid::Uuid;

use crate::database::map_sqlx;

pub struct StoreAccountRepository {
    pool: PgPool,
}

impl StoreAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PassengerAccounts for StoreAccountRepository {
    async fn link_booking(
        &self,
        passenger_id: Uuid,
        booking_id: Uuid,
        customer_reference: Option<&Masked<String>>,
    ) -> CoreResult<()> {
        // The account upsert only matches when the stored reference is
        // absent or equal; the link insert rides on that match.
        let (matched,): (bool,) = sqlx::query_as(
            r#"
            WITH account AS (
                INSERT INTO passenger_accounts (id, customer_reference)
                VALUES ($1, $3)
                ON CONFLICT (id) DO UPDATE
                    SET customer_reference = COALESCE(passenger_accounts.customer_reference, EXCLUDED.customer_reference)
                    WHERE passenger_accounts.customer_reference IS NULL
                       OR EXCLUDED.customer_reference IS NULL
                       OR passenger_accounts.customer_reference = EXCLUDED.customer_reference
                RETURNING id
            ),
            linked AS (
                INSERT INTO passenger_bookings (passenger_id, booking_id)
                SELECT id, $2 FROM account
                ON CONFLICT DO NOTHING
                RETURNING booking_id
            )
            SELECT EXISTS (SELECT 1 FROM account)
            "#,
        )
        .bind(passenger_id)
        .bind(booking_id)
        .bind(customer_reference.map(|r| r.expose().as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if !matched {
            return Err(CoreError::InvalidArgument("Customer reference does not match".into()));
        }
        Ok(())
    }

    async fn unlink_booking(&self, passenger_id: Uuid, booking_id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM passenger_bookings WHERE passenger_id = $1 AND booking_id = $2")
            .bind(passenger_id)
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn linked_bookings(&self, passenger_id: Uuid) -> CoreResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT booking_id FROM passenger_bookings WHERE passenger_id = $1")
            .bind(passenger_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
