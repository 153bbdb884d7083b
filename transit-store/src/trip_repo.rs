use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use transit_catalog::{CashTicket, Seat, SeatClaim, SeatState, Trip};
use transit_core::repository::InventoryStore;
use transit_core::{CoreError, CoreResult, DeviceCredential};
use uuid::Uuid;

use crate::database::map_sqlx;

/// Postgres inventory. Each conditional write is one statement whose
/// `WHERE` clause is the compare-and-set predicate, and counters change
/// in the same statement as the seat they follow.
pub struct StoreTripRepository {
    pool: PgPool,
}

impl StoreTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    route_id: Uuid,
    route_name: String,
    vehicle_id: Uuid,
    departure: DateTime<Utc>,
    booking_price: i64,
    booked_seats: i32,
    booked_revenue: i64,
    tickets_revenue: i64,
    number_of_tickets: i32,
    is_cancelled: bool,
    cancellation_fee_resolved: bool,
    completed: bool,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    seat_number: i32,
    state: String,
    booking_id: Option<Uuid>,
    start_point: Option<String>,
    end_point: Option<String>,
}

impl SeatRow {
    fn into_seat(self) -> CoreResult<Seat> {
        let claim = match (self.booking_id, self.start_point, self.end_point) {
            (Some(booking_id), Some(start), Some(end)) => Some(SeatClaim::new(booking_id, start, end)),
            _ => None,
        };
        let state = match (self.state.as_str(), claim) {
            ("FREE", _) => SeatState::Free,
            ("HELD", Some(claim)) => SeatState::Held(claim),
            ("CONFIRMED", Some(claim)) => SeatState::Confirmed(claim),
            (other, _) => {
                return Err(CoreError::Unavailable(format!(
                    "Corrupt seat {} (state {})",
                    self.seat_number, other
                )))
            }
        };
        Ok(Seat { seat_number: self.seat_number, state })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    start_point: String,
    end_point: String,
    ticket_price: i64,
    issued_at: DateTime<Utc>,
}

#[async_trait]
impl InventoryStore for StoreTripRepository {
    async fn create_trip(&self, trip: &Trip) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO trips (id, route_id, route_name, vehicle_id, departure, booking_price, capacity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(trip.id)
        .bind(trip.route_id)
        .bind(&trip.route_name)
        .bind(trip.vehicle_id)
        .bind(trip.departure)
        .bind(trip.booking_price)
        .bind(trip.capacity())
        .bind(trip.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            "INSERT INTO trip_seats (trip_id, seat_number) SELECT $1, generate_series(1, $2)",
        )
        .bind(trip.id)
        .bind(trip.capacity())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_trip(&self, trip_id: Uuid) -> CoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(
            r#"
            SELECT id, route_id, route_name, vehicle_id, departure, booking_price,
                   booked_seats, booked_revenue, tickets_revenue, number_of_tickets,
                   is_cancelled, cancellation_fee_resolved, completed, created_at
            FROM trips WHERE id = $1
            "#,
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let seats = sqlx::query_as::<_, SeatRow>(
            r#"
            SELECT seat_number, state, booking_id, start_point, end_point
            FROM trip_seats WHERE trip_id = $1 ORDER BY seat_number
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?
        .into_iter()
        .map(SeatRow::into_seat)
        .collect::<CoreResult<Vec<_>>>()?;

        let tickets = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT id, start_point, end_point, ticket_price, issued_at
            FROM cash_tickets WHERE trip_id = $1 ORDER BY issued_at
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?
        .into_iter()
        .map(|t| CashTicket {
            id: t.id,
            start_point: t.start_point,
            end_point: t.end_point,
            ticket_price: t.ticket_price,
            issued_at: t.issued_at,
        })
        .collect();

        Ok(Some(Trip {
            id: row.id,
            route_id: row.route_id,
            route_name: row.route_name,
            vehicle_id: row.vehicle_id,
            departure: row.departure,
            booking_price: row.booking_price,
            seats,
            booked_seats: row.booked_seats,
            booked_revenue: row.booked_revenue,
            tickets_revenue: row.tickets_revenue,
            number_of_tickets: row.number_of_tickets,
            tickets,
            is_cancelled: row.is_cancelled,
            cancellation_fee_resolved: row.cancellation_fee_resolved,
            completed: row.completed,
            created_at: row.created_at,
        }))
    }

    async fn hold_seat(&self, trip_id: Uuid, seat_number: i32, claim: &SeatClaim) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE trip_seats s
            SET state = 'HELD', booking_id = $3, start_point = $4, end_point = $5
            FROM trips t
            WHERE s.trip_id = $1 AND s.seat_number = $2 AND t.id = s.trip_id
              AND s.state <> 'CONFIRMED'
              AND NOT t.completed AND NOT t.is_cancelled
            "#,
        )
        .bind(trip_id)
        .bind(seat_number)
        .bind(claim.booking_id)
        .bind(&claim.start_point)
        .bind(&claim.end_point)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn confirm_seat(&self, trip_id: Uuid, seat_number: i32, claim: &SeatClaim, fare: i64) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            WITH seat AS (
                UPDATE trip_seats s
                SET state = 'CONFIRMED', booking_id = $3, start_point = $4, end_point = $5
                FROM trips t
                WHERE s.trip_id = $1 AND s.seat_number = $2 AND t.id = s.trip_id
                  AND NOT t.completed AND NOT t.is_cancelled
                  AND (s.state = 'FREE' OR (s.state = 'HELD' AND s.booking_id = $3))
                RETURNING s.trip_id
            )
            UPDATE trips
            SET booked_seats = booked_seats + 1, booked_revenue = booked_revenue + $6
            WHERE id IN (SELECT trip_id FROM seat)
            "#,
        )
        .bind(trip_id)
        .bind(seat_number)
        .bind(claim.booking_id)
        .bind(&claim.start_point)
        .bind(&claim.end_point)
        .bind(fare)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_seat(&self, trip_id: Uuid, seat_number: i32, booking_id: Uuid, fare: i64) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            WITH seat AS (
                UPDATE trip_seats s
                SET state = 'FREE', booking_id = NULL, start_point = NULL, end_point = NULL
                FROM trips t
                WHERE s.trip_id = $1 AND s.seat_number = $2 AND t.id = s.trip_id
                  AND NOT t.completed
                  AND s.state = 'CONFIRMED' AND s.booking_id = $3
                RETURNING s.trip_id
            )
            UPDATE trips
            SET booked_seats = booked_seats - 1, booked_revenue = booked_revenue - $4
            WHERE id IN (SELECT trip_id FROM seat)
            "#,
        )
        .bind(trip_id)
        .bind(seat_number)
        .bind(booking_id)
        .bind(fare)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_hold(&self, trip_id: Uuid, seat_number: i32, booking_id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE trip_seats
            SET state = 'FREE', booking_id = NULL, start_point = NULL, end_point = NULL
            WHERE trip_id = $1 AND seat_number = $2 AND state = 'HELD' AND booking_id = $3
            "#,
        )
        .bind(trip_id)
        .bind(seat_number)
        .bind(booking_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_ticket(&self, trip_id: Uuid, credential: &DeviceCredential, ticket: &CashTicket) -> CoreResult<bool> {
        // FOR SHARE on the vehicle row orders this write against a
        // concurrent revocation; a revoked epoch never matches.
        let result = sqlx::query(
            r#"
            WITH target AS (
                SELECT t.id
                FROM trips t
                JOIN vehicles v ON v.id = t.vehicle_id
                WHERE t.id = $1 AND v.id = $2
                  AND v.is_leased AND v.lease_epoch = $3
                  AND NOT t.completed AND NOT t.is_cancelled
                FOR SHARE OF v
            ),
            ticket AS (
                INSERT INTO cash_tickets (id, trip_id, start_point, end_point, ticket_price, issued_at)
                SELECT $4, id, $5, $6, $7, $8 FROM target
                RETURNING trip_id
            )
            UPDATE trips
            SET tickets_revenue = tickets_revenue + $7, number_of_tickets = number_of_tickets + 1
            WHERE id IN (SELECT trip_id FROM ticket)
            "#,
        )
        .bind(trip_id)
        .bind(credential.vehicle_id)
        .bind(credential.lease_epoch)
        .bind(ticket.id)
        .bind(&ticket.start_point)
        .bind(&ticket.end_point)
        .bind(ticket.ticket_price)
        .bind(ticket.issued_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed(&self, trip_id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("UPDATE trips SET completed = TRUE WHERE id = $1 AND NOT completed")
            .bind(trip_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}
