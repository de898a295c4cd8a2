//! `POST /procesar_articulo` and `POST /procesar_fragmento` (spec.md §4.5).
//! Validates, then dispatches sync or async by body size; every response,
//! success or error, carries the `X-Request-ID` header.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline_core::errors::{FieldError, PipelineError};
use pipeline_core::model::{Article, Fragment};
use pipeline_core::validation::{validate_article_json, validate_fragment_json};
use serde_json::Value;

use crate::dispatch::{article_dispatch_mode, fragment_dispatch_mode, DispatchMode};
use crate::error_response::ApiError;
use crate::state::AppState;

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn with_request_id(request_id: &str, mut response: Response) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

fn validation_error_response(request_id: &str, errors: Vec<FieldError>) -> Response {
    with_request_id(
        request_id,
        ApiError::new(PipelineError::Validation { fields: errors }, request_id).into_response(),
    )
}

pub async fn procesar_articulo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Response {
    let request_id = headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(new_request_id);

    let errors = validate_article_json(&raw, &state.validation);
    if !errors.is_empty() {
        return validation_error_response(&request_id, errors);
    }

    let article: Article = match serde_json::from_value(raw) {
        Ok(article) => article,
        Err(e) => {
            return validation_error_response(
                &request_id,
                vec![FieldError { field: "body".to_string(), error: e.to_string() }],
            );
        }
    };

    let body_len = serde_json::to_vec(&article).map(|b| b.len()).unwrap_or(usize::MAX);
    match article_dispatch_mode(body_len, state.config.sync_max_bytes_article) {
        DispatchMode::Sync => {
            let deadline = std::time::Instant::now() + state.config.sync_request_deadline;
            let result = state.controller.process_article(&article, &request_id, Some(deadline)).await;
            with_request_id(&request_id, (StatusCode::OK, Json(result)).into_response())
        }
        DispatchMode::Async => {
            let job_id = state.jobs.register(&request_id);
            spawn_article_job(state.clone(), article, request_id.clone(), job_id.clone());
            with_request_id(
                &request_id,
                (
                    StatusCode::OK,
                    Json(serde_json::json!({"request_id": request_id, "job_id": job_id, "status": "processing"})),
                )
                    .into_response(),
            )
        }
    }
}

pub async fn procesar_fragmento(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Response {
    let request_id = headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(new_request_id);

    let errors = validate_fragment_json(&raw, &state.validation);
    if !errors.is_empty() {
        return validation_error_response(&request_id, errors);
    }

    let fragment: Fragment = match serde_json::from_value(raw) {
        Ok(fragment) => fragment,
        Err(e) => {
            return validation_error_response(
                &request_id,
                vec![FieldError { field: "body".to_string(), error: e.to_string() }],
            );
        }
    };

    let body_len = serde_json::to_vec(&fragment).map(|b| b.len()).unwrap_or(usize::MAX);
    match fragment_dispatch_mode(body_len, state.config.sync_max_bytes_fragment) {
        DispatchMode::Sync => {
            let deadline = std::time::Instant::now() + state.config.sync_request_deadline;
            let result = state.controller.process_fragment(&fragment, &request_id, Some(deadline)).await;
            with_request_id(&request_id, (StatusCode::OK, Json(result)).into_response())
        }
        DispatchMode::Async => {
            let job_id = state.jobs.register(&request_id);
            spawn_fragment_job(state.clone(), fragment, request_id.clone(), job_id.clone());
            with_request_id(
                &request_id,
                (
                    StatusCode::OK,
                    Json(serde_json::json!({"request_id": request_id, "job_id": job_id, "status": "processing"})),
                )
                    .into_response(),
            )
        }
    }
}

/// Background jobs run with no deadline: the 60s sync deadline exists to
/// bound a held HTTP connection, which doesn't apply once the response has
/// already been sent and the client is polling `/status/{job_id}`.
fn spawn_article_job(state: AppState, article: Article, request_id: String, job_id: String) {
    tokio::spawn(async move {
        if state.jobs.start(&job_id).is_err() {
            return;
        }
        let result = state.controller.process_article(&article, &request_id, None).await;
        match serde_json::to_value(&result) {
            Ok(value) => {
                let _ = state.jobs.complete(&job_id, value);
            }
            Err(e) => {
                let _ = state.jobs.fail(&job_id, &e.to_string());
            }
        }
    });
}

fn spawn_fragment_job(state: AppState, fragment: Fragment, request_id: String, job_id: String) {
    tokio::spawn(async move {
        if state.jobs.start(&job_id).is_err() {
            return;
        }
        let result = state.controller.process_fragment(&fragment, &request_id, None).await;
        match serde_json::to_value(&result) {
            Ok(value) => {
                let _ = state.jobs.complete(&job_id, value);
            }
            Err(e) => {
                let _ = state.jobs.fail(&job_id, &e.to_string());
            }
        }
    });
}
