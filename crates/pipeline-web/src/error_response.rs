//! Maps `PipelineError` onto the HTTP surface's response shape. Kept
//! separate from `routes/` because every handler needs it, and the mapping
//! itself carries no handler-specific state.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline_core::errors::PipelineError;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detalles: Option<serde_json::Value>,
    pub support_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub request_id: String,
}

/// Carries the error plus the request ID it should be reported under, so a
/// handler can build the body in one place regardless of which phase the
/// error surfaced from.
pub struct ApiError {
    pub error: PipelineError,
    pub request_id: String,
}

impl ApiError {
    pub fn new(error: PipelineError, request_id: impl Into<String>) -> Self {
        ApiError { error, request_id: request_id.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, phase) = match &self.error {
            PipelineError::Validation { .. } => (StatusCode::BAD_REQUEST, 0),
            PipelineError::LlmUnavailable { .. } => (StatusCode::BAD_GATEWAY, 2),
            PipelineError::DatastoreRpcError { pool_exhausted, .. } => {
                (if *pool_exhausted { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::BAD_GATEWAY }, 4)
            }
            PipelineError::Processing { phase, .. } => (StatusCode::UNPROCESSABLE_ENTITY, *phase),
            PipelineError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, 0),
            PipelineError::Cancelled { .. } => (StatusCode::GATEWAY_TIMEOUT, 0),
        };

        let detalles = match &self.error {
            PipelineError::Validation { fields } => Some(serde_json::to_value(fields).unwrap_or_default()),
            _ => None,
        };

        let body = ErrorBody {
            error: self.error.to_string(),
            detalles,
            support_code: self.error.support_code(phase),
            retry_after: self.error.retry_after_secs(),
            request_id: self.request_id,
        };

        (status, Json(body)).into_response()
    }
}
