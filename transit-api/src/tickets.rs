use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use transit_catalog::CashTicket;
use transit_core::Booking;
use transit_reservation::RecordTicketsRequest;
use uuid::Uuid;

use crate::auth::Device;
use crate::error::{ApiJson, ApiPath, AppError};
use crate::state::AppState;

/// Either the scanned proof token or the passenger id read off the ticket.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyBookingRequest {
    #[serde(default)]
    pub passenger_id: Option<Uuid>,
    #[serde(default)]
    pub proof: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets", post(record_tickets))
        .route("/v1/bookings/{id}/verify", post(verify_booking))
}

async fn record_tickets(
    State(state): State<AppState>,
    Device(credential): Device,
    ApiJson(req): ApiJson<RecordTicketsRequest>,
) -> Result<(StatusCode, Json<Vec<CashTicket>>), AppError> {
    let recorded = state.engine.record_walk_up_tickets(&credential, req).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

async fn verify_booking(
    State(state): State<AppState>,
    Device(credential): Device,
    ApiPath(booking_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<VerifyBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    let passenger_id = match (req.proof, req.passenger_id) {
        (Some(token), _) => {
            let proof = state.engine.proofs().verify(&token)?;
            if proof.booking_id != booking_id {
                return Err(AppError::BadRequest(
                    "Proof of purchase is for a different booking".into(),
                ));
            }
            proof.passenger_id
        }
        (None, Some(passenger_id)) => passenger_id,
        (None, None) => {
            return Err(AppError::BadRequest(
                "Either proof or passenger_id is required".into(),
            ))
        }
    };

    let booking = state
        .engine
        .verify_booking(&credential, booking_id, passenger_id)
        .await?;
    Ok(Json(booking))
}
