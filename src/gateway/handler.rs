use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, info, instrument};

use crate::cache::GROVE_CACHE_HEADER;
use crate::gateway::error::GatewayError;
use crate::gateway::payload::{ApiResponse, ScoreData, ScoreRequest};
use crate::gateway::state::HandlerState;
use crate::scoring::score_blocking;

#[instrument(
    skip(state, payload),
    fields(request_id = %uuid::Uuid::new_v4(), cache = tracing::field::Empty)
)]
pub async fn extract_handler(
    State(state): State<HandlerState>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(request) = payload.map_err(|rejection| GatewayError::BadRequest(rejection.body_text()))?;

    let key = state.keys.build(&request.inputs)?;
    debug!(key = %key, input_len = request.inputs.len(), "Scoring request");

    let scorer = Arc::clone(&state.scorer);
    let inputs = request.inputs;
    let lookup = state
        .cache
        .get_or_compute_with_status(&key, move || score_blocking(scorer, inputs));

    let lookup = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, lookup)
            .await
            .map_err(|_| GatewayError::Timeout(limit))??,
        None => lookup.await?,
    };

    tracing::Span::current().record("cache", tracing::field::display(lookup.status));
    info!(dec_score = lookup.value, status = %lookup.status, "Variability extracted");

    let mut headers = HeaderMap::new();
    headers.insert(
        GROVE_CACHE_HEADER,
        HeaderValue::from_static(lookup.status.as_header_value()),
    );

    Ok((
        StatusCode::OK,
        headers,
        Json(ApiResponse::ok(ScoreData {
            dec_score: lookup.value,
        })),
    )
        .into_response())
}
