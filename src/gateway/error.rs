use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use crate::cache::{BackendError, CacheError, InvalidInputError};
use crate::gateway::payload::ApiResponse;
use crate::scoring::ScoringError;

pub const CODE_INVALID_INPUT: &str = "INVALID_INPUT";
pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";
pub const CODE_SCORING_ERROR: &str = "SCORING_ERROR";
pub const CODE_INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const CODE_CACHE_UNAVAILABLE: &str = "CACHE_UNAVAILABLE";
pub const CODE_TIMEOUT: &str = "TIMEOUT";

pub const INVALID_INPUT_MESSAGE: &str = "inputs must not be empty or whitespace-only";
pub const SCORING_FAILED_MESSAGE: &str = "variability scoring failed";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("scoring failed: {0}")]
    Scoring(Arc<ScoringError>),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(BackendError),

    #[error("computation aborted")]
    Aborted,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Scoring(e) => GatewayError::Scoring(e),
            CacheError::Backend(e) => GatewayError::CacheUnavailable(e),
            CacheError::Aborted => GatewayError::Aborted,
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidInput(_) | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Scoring(_) | GatewayError::Aborted => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidInput(_) => CODE_INVALID_INPUT,
            GatewayError::BadRequest(_) => CODE_BAD_REQUEST,
            GatewayError::Scoring(_) => CODE_SCORING_ERROR,
            GatewayError::Aborted => CODE_INTERNAL_ERROR,
            GatewayError::CacheUnavailable(_) => CODE_CACHE_UNAVAILABLE,
            GatewayError::Timeout(_) => CODE_TIMEOUT,
        }
    }

    /// Client-facing message. Internal causes of 5xx errors stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::InvalidInput(_) => INVALID_INPUT_MESSAGE.to_string(),
            GatewayError::BadRequest(reason) => reason.clone(),
            GatewayError::Scoring(_) => SCORING_FAILED_MESSAGE.to_string(),
            GatewayError::Aborted => "score computation aborted".to_string(),
            GatewayError::CacheUnavailable(BackendError::Closed) => {
                "service is shutting down".to_string()
            }
            GatewayError::CacheUnavailable(_) => "score cache unavailable".to_string(),
            GatewayError::Timeout(limit) => {
                format!("request timed out after {}ms", limit.as_millis())
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        } else {
            debug!(code = self.code(), error = %self, "Request rejected");
        }

        let body = Json(ApiResponse::<()>::error(self.code(), self.public_message()));
        (status, body).into_response()
    }
}
