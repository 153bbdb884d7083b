use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use transit_core::Principal;
use uuid::Uuid;

use crate::auth::{Caller, Owner};
use crate::error::{ApiJson, ApiPath, AppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceLoginRequest {
    pub vehicle_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeviceLoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub vehicle_id: Uuid,
    pub lease_epoch: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/devices/login", post(device_login))
        .route("/v1/vehicles/{id}/machine/enable", post(enable_machine))
        .route("/v1/vehicles/{id}/machine/release", post(release_machine))
        .route("/v1/vehicles/{id}/machine/revoke", post(revoke_machine))
}

/// POST /v1/devices/login
/// Succeeds only while the owner has the machine enabled and no other
/// terminal holds the lease.
async fn device_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DeviceLoginRequest>,
) -> Result<Json<DeviceLoginResponse>, AppError> {
    let credential = state.engine.leases().acquire(req.vehicle_id).await?;
    let access_token = state.tokens.issue(&Principal::Device(credential))?;

    Ok(Json(DeviceLoginResponse {
        access_token,
        token_type: "Bearer".into(),
        vehicle_id: credential.vehicle_id,
        lease_epoch: credential.lease_epoch,
    }))
}

async fn enable_machine(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiPath(vehicle_id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    state.engine.leases().enable_machine(owner_id, vehicle_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn release_machine(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ApiPath(vehicle_id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    state.engine.leases().release(&principal, vehicle_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_machine(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiPath(vehicle_id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    state.engine.leases().force_revoke(owner_id, vehicle_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
