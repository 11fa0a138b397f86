//! HTTP gateway (Axum) for variability extraction.
//!
//! This module is primarily used by the `grove` server binary.

pub mod error;
pub mod handler;
pub mod payload;
pub mod state;


use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub use error::GatewayError;
pub use handler::extract_handler;
pub use payload::{ApiResponse, ScoreData, ScoreRequest};
pub use state::HandlerState;

use crate::cache::{GROVE_STATUS_CLOSED, GROVE_STATUS_NOT_READY, GROVE_STATUS_READY};
use crate::constants::EXTRACT_ROUTE;

pub fn create_router(state: HandlerState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route(EXTRACT_ROUTE, post(extract_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct ReadyResponse {
    pub status: String,
    pub backend: String,
    pub scorer_mode: String,
    pub entries: Option<u64>,
    pub in_flight: usize,
}

#[tracing::instrument]
pub async fn health_handler() -> Response {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
        .into_response()
}

#[tracing::instrument(skip(state))]
pub async fn ready_handler(State(state): State<HandlerState>) -> Response {
    let backend = state.cache.backend();

    let (status, entries) = if backend.is_closed() {
        (GROVE_STATUS_CLOSED, None)
    } else {
        match backend.len().await {
            Ok(count) => (GROVE_STATUS_READY, Some(count)),
            Err(e) => {
                tracing::warn!(error = %e, "Backend not ready");
                (GROVE_STATUS_NOT_READY, None)
            }
        }
    };

    let status_code = if status == GROVE_STATUS_READY {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadyResponse {
            status: status.to_string(),
            backend: backend.name().to_string(),
            scorer_mode: state.scorer.mode().to_string(),
            entries,
            in_flight: state.cache.in_flight(),
        }),
    )
        .into_response()
}
