use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use transit_core::Booking;
use transit_reservation::{BookingHistory, InitializeBookingRequest, RescheduleRequest};
use uuid::Uuid;

use crate::auth::Passenger;
use crate::error::{ApiJson, ApiPath, AppError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(initialize_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/reschedule", post(reschedule_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

/// POST /v1/bookings
/// Holds the seat and returns the `Pending` booking with its fare breakdown.
/// The booking becomes `Booked` when the payment webhook arrives.
async fn initialize_booking(
    State(state): State<AppState>,
    Passenger(passenger_id): Passenger,
    ApiJson(req): ApiJson<InitializeBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.engine.initialize_booking(passenger_id, req).await?;
    info!(
        "Passenger {} holds seat {} on trip {} (booking {})",
        passenger_id, booking.seat_number, booking.trip_id, booking.id
    );
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(
    State(state): State<AppState>,
    Passenger(passenger_id): Passenger,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.get_booking(passenger_id, booking_id).await?))
}

async fn list_bookings(
    State(state): State<AppState>,
    Passenger(passenger_id): Passenger,
) -> Result<Json<BookingHistory>, AppError> {
    Ok(Json(state.engine.bookings_for_passenger(passenger_id).await?))
}

/// Returns the replacement booking.
async fn reschedule_booking(
    State(state): State<AppState>,
    Passenger(passenger_id): Passenger,
    ApiPath(booking_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RescheduleRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(
        state
            .engine
            .reschedule_booking(passenger_id, booking_id, req)
            .await?,
    ))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Passenger(passenger_id): Passenger,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.cancel_booking(passenger_id, booking_id).await?))
}
