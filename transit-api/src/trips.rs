use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use transit_catalog::{SeatAvailability, Trip};
use transit_reservation::{CloseReport, ScheduleTripRequest, TripTickets};
use uuid::Uuid;

use crate::auth::{Device, Owner};
use crate::error::{ApiJson, ApiPath, AppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvailabilityRequest {
    pub seat_numbers: Vec<i32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", post(schedule_trip))
        .route("/v1/trips/{id}", get(get_trip))
        .route("/v1/trips/{id}/availability", post(check_availability))
        .route("/v1/trips/{id}/tickets", get(trip_tickets))
        .route("/v1/trips/{id}/close", post(close_trip))
}

async fn schedule_trip(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiJson(req): ApiJson<ScheduleTripRequest>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let trip = state.engine.schedule_trip(owner_id, req).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn get_trip(
    State(state): State<AppState>,
    ApiPath(trip_id): ApiPath<Uuid>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.engine.trip(trip_id).await?))
}

async fn check_availability(
    State(state): State<AppState>,
    ApiPath(trip_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AvailabilityRequest>,
) -> Result<Json<Vec<SeatAvailability>>, AppError> {
    Ok(Json(
        state.engine.check_availability(trip_id, &req.seat_numbers).await?,
    ))
}

async fn trip_tickets(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiPath(trip_id): ApiPath<Uuid>,
) -> Result<Json<TripTickets>, AppError> {
    Ok(Json(state.engine.trip_tickets(owner_id, trip_id).await?))
}

async fn close_trip(
    State(state): State<AppState>,
    Device(credential): Device,
    ApiPath(trip_id): ApiPath<Uuid>,
) -> Result<Json<CloseReport>, AppError> {
    Ok(Json(
        state.reconciler.close_trip_for_device(&credential, trip_id).await?,
    ))
}
