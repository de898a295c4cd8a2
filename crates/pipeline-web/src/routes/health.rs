//! `GET /health` and `GET /health/detailed` (spec.md §4.6 endpoint b;
//! SPEC_FULL.md §3). `/health` is a cheap liveness probe; `/health/detailed`
//! runs four checks — LLM, datastore, filesystem, controller readiness —
//! and returns 503 if any of them fails.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline_core::circuit_breaker::BreakerState;
use serde::Serialize;

use crate::state::AppState;

pub async fn health() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

#[derive(Serialize)]
struct CheckResult {
    status: &'static str,
    response_time_ms: u64,
    message: String,
}

impl CheckResult {
    fn pass(started: Instant, message: impl Into<String>) -> Self {
        CheckResult { status: "pass", response_time_ms: started.elapsed().as_millis() as u64, message: message.into() }
    }

    fn fail(started: Instant, message: impl Into<String>) -> Self {
        CheckResult { status: "fail", response_time_ms: started.elapsed().as_millis() as u64, message: message.into() }
    }

    fn healthy(&self) -> bool {
        self.status == "pass"
    }
}

#[derive(Serialize)]
struct DetailedHealth {
    status: String,
    uptime_seconds: u64,
    checks: std::collections::HashMap<&'static str, CheckResult>,
}

fn breaker_label(state: BreakerState) -> &'static str {
    match state {
        BreakerState::Closed => "CLOSED",
        BreakerState::Open => "OPEN",
        BreakerState::HalfOpen => "HALF_OPEN",
    }
}

fn breaker_check(name: &'static str, state: BreakerState) -> CheckResult {
    let started = Instant::now();
    if matches!(state, BreakerState::Open) {
        CheckResult::fail(started, format!("{name} circuit breaker is OPEN"))
    } else {
        CheckResult::pass(started, format!("{name} circuit breaker is {}", breaker_label(state)))
    }
}

/// Writes then reads back a small probe file in the configured scratch
/// directory — catches a read-only or full filesystem before the pipeline
/// tries to use it for real work.
fn filesystem_check(scratch_dir: &str) -> CheckResult {
    let started = Instant::now();
    let path = std::path::Path::new(scratch_dir).join(format!(".health-probe-{}", uuid::Uuid::new_v4()));
    let probe = b"ok";
    let result = std::fs::write(&path, probe).and_then(|_| std::fs::read(&path));
    let _ = std::fs::remove_file(&path);
    match result {
        Ok(contents) if contents == probe => CheckResult::pass(started, format!("wrote and read back probe in {scratch_dir}")),
        Ok(_) => CheckResult::fail(started, "probe file contents did not round-trip"),
        Err(e) => CheckResult::fail(started, format!("filesystem write/read failed: {e}")),
    }
}

fn readiness_check(ready: bool) -> CheckResult {
    let started = Instant::now();
    if ready {
        CheckResult::pass(started, "controller accepted startup checks")
    } else {
        CheckResult::fail(started, "controller has not finished startup")
    }
}

pub async fn health_detailed(State(state): State<AppState>) -> Response {
    let mut checks = std::collections::HashMap::new();
    checks.insert("llm", breaker_check("llm", state.llm.breaker().state()));
    checks.insert("datastore", breaker_check("datastore", state.datastore.breaker().state()));
    checks.insert("filesystem", filesystem_check(&state.config.scratch_dir));
    checks.insert("controller_readiness", readiness_check(state.is_ready()));

    let all_healthy = checks.values().all(CheckResult::healthy);
    let http_status = if all_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let body = DetailedHealth {
        status: if all_healthy { "ok".to_string() } else { "degraded".to_string() },
        uptime_seconds: state.metrics.uptime_seconds(),
        checks,
    };

    (http_status, Json(body)).into_response()
}
