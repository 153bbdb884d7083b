use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

use crate::error::SeatConflict;
use crate::state::AppState;

/// Prometheus collectors owned by the service rather than the global
/// registry, so tests can build as many states as they like.
pub struct Metrics {
    registry: Registry,
    http_requests: CounterVec,
    http_duration: HistogramVec,
    booking_conflicts: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests = CounterVec::new(
            Opts::new("transit_http_requests_total", "HTTP requests by route and status"),
            &["method", "path", "status"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new("transit_http_request_duration_seconds", "HTTP request latency")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        let booking_conflicts = IntCounter::new(
            "transit_booking_conflicts_total",
            "Bookings refused because the seat was taken",
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;
        registry.register(Box::new(booking_conflicts.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            http_duration,
            booking_conflicts,
        })
    }

    pub fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        self.http_requests
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_duration
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_seat_conflict(&self) {
        self.booking_conflicts.inc();
    }

    pub fn booking_conflicts(&self) -> u64 {
        self.booking_conflicts.get()
    }

    pub fn encode(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}

/// Labels by the matched route template so ids do not explode cardinality.
pub async fn track_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;

    state.metrics.record_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    if response.extensions().get::<SeatConflict>().is_some() {
        state.metrics.record_seat_conflict();
    }

    response
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
