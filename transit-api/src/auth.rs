use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use transit_core::{CoreError, CoreResult, DeviceCredential, IdentityResolver, Principal};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// `sub` is the passenger, owner or vehicle id depending on `role`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_epoch: Option<i64>,
    pub exp: usize,
}

/// HS256 tokens. Passenger and owner tokens are issued by the account
/// service sharing the secret; device tokens are minted here at login.
#[derive(Clone)]
pub struct JwtAuth {
    secret: String,
    expiration_seconds: u64,
    device_ttl_seconds: u64,
}

impl JwtAuth {
    pub fn new(secret: impl Into<String>, expiration_seconds: u64, device_ttl_seconds: u64) -> Self {
        Self {
            secret: secret.into(),
            expiration_seconds,
            device_ttl_seconds,
        }
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, AppError> {
        let (sub, lease_epoch, ttl) = match principal {
            Principal::Passenger(id) | Principal::Owner(id) => (*id, None, self.expiration_seconds),
            Principal::Device(credential) => (
                credential.vehicle_id,
                Some(credential.lease_epoch),
                self.device_ttl_seconds,
            ),
        };
        let claims = Claims {
            sub,
            role: principal.role().to_string(),
            lease_epoch,
            exp: (Utc::now() + Duration::seconds(ttl as i64)).timestamp() as usize,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
    }
}

#[async_trait]
impl IdentityResolver for JwtAuth {
    async fn resolve(&self, bearer: &str) -> CoreResult<Principal> {
        let token = decode::<Claims>(
            bearer,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| CoreError::Unauthorized("Invalid or expired access token".into()))?;

        let claims = token.claims;
        match claims.role.as_str() {
            "PASSENGER" => Ok(Principal::Passenger(claims.sub)),
            "OWNER" => Ok(Principal::Owner(claims.sub)),
            "DEVICE" => {
                let lease_epoch = claims
                    .lease_epoch
                    .ok_or_else(|| CoreError::Unauthorized("Device token without lease epoch".into()))?;
                Ok(Principal::Device(DeviceCredential {
                    vehicle_id: claims.sub,
                    lease_epoch,
                }))
            }
            other => Err(CoreError::Unauthorized(format!("Unknown role {}", other))),
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// Any authenticated caller.
pub struct Caller(pub Principal);

pub struct Passenger(pub Uuid);

pub struct Owner(pub Uuid);

/// A terminal holding a lease. The epoch is checked by the operation, not here.
pub struct Device(pub DeviceCredential);

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| CoreError::Unauthorized("Access token required".into()))?;

        Ok(Caller(state.identity.resolve(bearer.token()).await?))
    }
}

fn wrong_role(principal: &Principal, wanted: &str) -> AppError {
    AppError::Core(CoreError::Forbidden(format!(
        "{} token cannot be used here, {} required",
        principal.role(),
        wanted
    )))
}

impl FromRequestParts<AppState> for Passenger {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Caller::from_request_parts(parts, state).await?.0 {
            Principal::Passenger(id) => Ok(Passenger(id)),
            other => Err(wrong_role(&other, "PASSENGER")),
        }
    }
}

impl FromRequestParts<AppState> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Caller::from_request_parts(parts, state).await?.0 {
            Principal::Owner(id) => Ok(Owner(id)),
            other => Err(wrong_role(&other, "OWNER")),
        }
    }
}

impl FromRequestParts<AppState> for Device {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Caller::from_request_parts(parts, state).await?.0 {
            Principal::Device(credential) => Ok(Device(credential)),
            other => Err(wrong_role(&other, "DEVICE")),
        }
    }
}
