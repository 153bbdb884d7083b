use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use transit_catalog::Fare;
use transit_core::repository::BookingLedger;
use transit_core::{Booking, BookingStatus, BookingUpdate, CoreError, CoreResult};
use uuid::Uuid;

use crate::database::map_sqlx;

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOKING_COLUMNS: &str = r#"
    id, trip_id, vehicle_id, seat_number, passenger_id, transaction_reference,
    base_fee, commission, total_price, start_point_id, end_point_id, start_point, end_point,
    trip_departure, status, proof_of_purchase, refund_amount, refund_resolved,
    replaced_by, replaces, created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    vehicle_id: Uuid,
    seat_number: i32,
    passenger_id: Uuid,
    transaction_reference: String,
    base_fee: i64,
    commission: i64,
    total_price: i64,
    start_point_id: Uuid,
    end_point_id: Uuid,
    start_point: String,
    end_point: String,
    trip_departure: DateTime<Utc>,
    status: String,
    proof_of_purchase: Option<String>,
    refund_amount: Option<i64>,
    refund_resolved: bool,
    replaced_by: Option<Uuid>,
    replaces: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            trip_id: row.trip_id,
            vehicle_id: row.vehicle_id,
            seat_number: row.seat_number,
            passenger_id: row.passenger_id,
            transaction_reference: row.transaction_reference,
            fare: Fare {
                base_fee: row.base_fee,
                commission: row.commission,
                total_price: row.total_price,
            },
            start_point_id: row.start_point_id,
            end_point_id: row.end_point_id,
            start_point: row.start_point,
            end_point: row.end_point,
            trip_departure: row.trip_departure,
            status: row.status.parse()?,
            proof_of_purchase: row.proof_of_purchase,
            refund_amount: row.refund_amount,
            refund_resolved: row.refund_resolved,
            replaced_by: row.replaced_by,
            replaces: row.replaces,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn status_names(statuses: &[BookingStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn into_bookings(rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[async_trait]
impl BookingLedger for StoreBookingRepository {
    async fn insert(&self, booking: &Booking) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, trip_id, vehicle_id, seat_number, passenger_id, transaction_reference,
                base_fee, commission, total_price, start_point_id, end_point_id, start_point, end_point,
                trip_departure, status, proof_of_purchase, refund_amount, refund_resolved,
                replaced_by, replaces, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(booking.id)
        .bind(booking.trip_id)
        .bind(booking.vehicle_id)
        .bind(booking.seat_number)
        .bind(booking.passenger_id)
        .bind(&booking.transaction_reference)
        .bind(booking.fare.base_fee)
        .bind(booking.fare.commission)
        .bind(booking.fare.total_price)
        .bind(booking.start_point_id)
        .bind(booking.end_point_id)
        .bind(&booking.start_point)
        .bind(&booking.end_point)
        .bind(booking.trip_departure)
        .bind(booking.status.as_str())
        .bind(&booking.proof_of_purchase)
        .bind(booking.refund_amount)
        .bind(booking.refund_resolved)
        .bind(booking.replaced_by)
        .bind(booking.replaces)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(Booking::try_from)
            .transpose()
    }

    async fn find_by_transaction(&self, transaction_reference: &str) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE transaction_reference = $1", BOOKING_COLUMNS);
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(transaction_reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(Booking::try_from)
            .transpose()
    }

    async fn transition(&self, booking_id: Uuid, from: &[BookingStatus], update: &BookingUpdate) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2,
                refund_amount = COALESCE($3, refund_amount),
                refund_resolved = COALESCE($4, refund_resolved),
                replaced_by = COALESCE($5, replaced_by),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($6)
            "#,
        )
        .bind(booking_id)
        .bind(update.status.as_str())
        .bind(update.refund_amount)
        .bind(update.refund_resolved)
        .bind(update.replaced_by)
        .bind(status_names(from))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_proof(&self, booking_id: Uuid, proof: &str) -> CoreResult<()> {
        let result = sqlx::query("UPDATE bookings SET proof_of_purchase = $2, updated_at = NOW() WHERE id = $1")
            .bind(booking_id)
            .bind(proof)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Booking {} not found", booking_id)));
        }
        Ok(())
    }

    async fn transition_for_trip(&self, trip_id: Uuid, from: BookingStatus, to: BookingStatus) -> CoreResult<u64> {
        let result = sqlx::query(
            "UPDATE bookings SET status = $3, updated_at = NOW() WHERE trip_id = $1 AND status = $2",
        )
        .bind(trip_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn list_stale(&self, statuses: &[BookingStatus], cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = ANY($1) AND updated_at < $2 ORDER BY updated_at",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(status_names(statuses))
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        into_bookings(rows)
    }

    async fn list_departed(&self, statuses: &[BookingStatus], cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = ANY($1) AND trip_departure < $2 ORDER BY trip_departure",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(status_names(statuses))
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        into_bookings(rows)
    }

    async fn list_for_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE passenger_id = $1 ORDER BY trip_departure DESC",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(passenger_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        into_bookings(rows)
    }

    async fn active_for_seat(&self, trip_id: Uuid, seat_number: i32) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE trip_id = $1 AND seat_number = $2 AND status = ANY($3)",
            BOOKING_COLUMNS
        );
        let live = [BookingStatus::Booked, BookingStatus::Verified, BookingStatus::Rescheduling];
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(trip_id)
            .bind(seat_number)
            .bind(status_names(&live))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        into_bookings(rows)
    }
}
