use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use transit_store::redis_repo::rate_limit_key;

pub mod auth;
pub mod bookings;
pub mod devices;
pub mod error;
pub mod metrics;
pub mod state;
pub mod tickets;
pub mod trips;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

use crate::error::AppError;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .merge(trips::routes())
        .merge(bookings::routes())
        .merge(tickets::routes())
        .merge(devices::routes())
        .merge(webhooks::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), metrics::track_metrics))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

/// Per-IP fixed window. Skipped without Redis or a peer address, and fails
/// open when Redis errors.
async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(redis) = &state.redis else {
        return next.run(req).await;
    };
    let Some(addr) = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
    else {
        return next.run(req).await;
    };

    let key = rate_limit_key(&addr.ip().to_string());
    match redis
        .check_rate_limit(&key, state.business_rules.rate_limit_per_minute, 60)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => AppError::RateLimited.into_response(),
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            next.run(req).await
        }
    }
}
