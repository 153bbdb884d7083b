use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use transit_core::{CoreError, ErrorKind, PaymentConfirmation};
use uuid::Uuid;

use crate::error::{ApiJson, AppError};
use crate::state::AppState;

const CONFIRMED_EVENT: &str = "NOTIFY_TRANSACTION_CHANGE";
const CONFIRMED_STATE: &str = "CONFIRMED";

/// Payment provider notification. The provider adds fields freely, so
/// unknown ones are ignored here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    pub event_type: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
}

impl WebhookAck {
    fn status(status: &'static str) -> Self {
        Self { status, booking_id: None }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Confirms the booking behind a settled transaction. Retried deliveries of
/// an already processed transaction are acknowledged without side effects;
/// a payment for a booking that closed unconfirmed is answered with 409.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<PaymentWebhook>,
) -> Result<Json<WebhookAck>, AppError> {
    if let Some(key) = &state.payment_webhook_key {
        verify_signature(&headers, key)?;
    }

    if payload.event_type != CONFIRMED_EVENT || payload.state.as_deref() != Some(CONFIRMED_STATE) {
        info!("Ignoring payment event {} ({:?})", payload.event_type, payload.state);
        return Ok(Json(WebhookAck::status("ignored")));
    }

    let (Some(transaction_id), Some(customer_id)) = (payload.transaction_id, payload.customer_id) else {
        return Err(AppError::BadRequest("transactionId and customerId are required".into()));
    };
    info!("Payment confirmed for transaction {}", transaction_id);

    match state
        .engine
        .confirm_booking(PaymentConfirmation::new(transaction_id.as_str(), customer_id))
        .await
    {
        Ok(booking) => Ok(Json(WebhookAck {
            status: "booked",
            booking_id: Some(booking.id),
        })),
        Err(e) if e.kind() == ErrorKind::Conflict && !e.is_seat_conflict() && !e.is_payment_not_applied() => {
            warn!("Duplicate payment callback for {}: {}", transaction_id, e);
            Ok(Json(WebhookAck::status("already_processed")))
        }
        Err(e) => Err(e.into()),
    }
}

/// `X-Signature` is hex `sha256(nonce || timestamp || key)`.
fn verify_signature(headers: &HeaderMap, key: &str) -> Result<(), AppError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    };
    let nonce = header("x-signature-nonce");
    let timestamp = header("x-signature-timestamp");
    let signature = header("x-signature");

    let expected = expected_signature(nonce, timestamp, key);
    if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        warn!("Rejected payment webhook with a bad signature");
        return Err(CoreError::Forbidden("Invalid signature".into()).into());
    }
    Ok(())
}

pub fn expected_signature(nonce: &str, timestamp: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_signature_round() {
        let sig = expected_signature("n-1", "1700000000", "key");
        assert_eq!(sig.len(), 64);

        let mut headers = HeaderMap::new();
        headers.insert("x-signature-nonce", HeaderValue::from_static("n-1"));
        headers.insert("x-signature-timestamp", HeaderValue::from_static("1700000000"));
        headers.insert("x-signature", HeaderValue::from_str(&sig).unwrap());
        assert!(verify_signature(&headers, "key").is_ok());
        assert!(verify_signature(&headers, "other-key").is_err());

        let mut tampered = sig.clone().into_bytes();
        tampered[63] = if tampered[63] == b'0' { b'1' } else { b'0' };
        headers.insert(
            "x-signature",
            HeaderValue::from_str(std::str::from_utf8(&tampered).unwrap()).unwrap(),
        );
        assert!(verify_signature(&headers, "key").is_err());
        headers.insert("x-signature", HeaderValue::from_str(&sig[..63]).unwrap());
        assert!(verify_signature(&headers, "key").is_err());

        headers.remove("x-signature");
        assert!(verify_signature(&headers, "key").is_err());
    }

    #[test]
    fn test_payload_tolerates_provider_fields() {
        let json = r#"{"eventType":"NOTIFY_TRANSACTION_CHANGE","state":"CONFIRMED",
            "transactionId":"txn-1","customerId":"cus-1","amount":1070,"currency":"LKR"}"#;
        let payload: PaymentWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(payload.transaction_id.as_deref(), Some("txn-1"));
    }
}
