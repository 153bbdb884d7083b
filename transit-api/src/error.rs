use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use transit_core::{CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("{0}")]
    Internal(String),
}

/// Response marker read by the metrics middleware.
#[derive(Debug, Clone, Copy)]
pub struct SeatConflict;

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Core(e) if e.is_seat_conflict() => (StatusCode::CONFLICT, "SEAT_UNAVAILABLE"),
            AppError::Core(e) if e.is_payment_not_applied() => (StatusCode::CONFLICT, "PAYMENT_NOT_APPLIED"),
            AppError::Core(e) => match e.kind() {
                ErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
                ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                ErrorKind::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            },
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Core(e) if e.kind() == ErrorKind::Unavailable => {
                tracing::error!("Store unavailable: {}", e);
                "Service temporarily unavailable, retry later".to_string()
            }
            other => other.to_string(),
        };

        let seat_conflict = matches!(&self, AppError::Core(e) if e.is_seat_conflict());

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        let mut response = (status, body).into_response();
        if seat_conflict {
            response.extensions_mut().insert(SeatConflict);
        }
        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// `Json` whose rejections use the API error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Path` whose rejections use the API error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_taxonomy_maps_to_status() {
        let cases = [
            (CoreError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (CoreError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (CoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CoreError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_seat_conflict_is_marked() {
        let err = AppError::from(CoreError::SeatUnavailable {
            trip_id: Uuid::new_v4(),
            seat_number: 3,
        });
        assert_eq!(err.status_and_code().1, "SEAT_UNAVAILABLE");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.extensions().get::<SeatConflict>().is_some());

        let generic = AppError::from(CoreError::Conflict("Booking already confirmed".into())).into_response();
        assert!(generic.extensions().get::<SeatConflict>().is_none());

        let unapplied = AppError::from(CoreError::PaymentNotApplied {
            booking_id: Uuid::new_v4(),
            status: transit_core::BookingStatus::Abandoned,
        });
        assert_eq!(unapplied.status_and_code(), (StatusCode::CONFLICT, "PAYMENT_NOT_APPLIED"));
    }
}
