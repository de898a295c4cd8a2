//! `GET /metrics`, `/monitoring/dashboard`, `/monitoring/pipeline-status`,
//! `/monitoring/alerts[?active_only=1]`, `/monitoring/alerts/summary`, and
//! `POST /monitoring/alerts/test` (spec.md §4.6).

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline_core::alerts::{Alert, Severity};
use pipeline_core::circuit_breaker::BreakerState;

use crate::state::AppState;

pub async fn metrics_prometheus(State(state): State<AppState>) -> Response {
    (StatusCode::OK, state.metrics.render_prometheus()).into_response()
}

fn breaker_label(state: BreakerState) -> &'static str {
    match state {
        BreakerState::Closed => "CLOSED",
        BreakerState::Open => "OPEN",
        BreakerState::HalfOpen => "HALF_OPEN",
    }
}

pub async fn dashboard(State(state): State<AppState>) -> Response {
    let latency_histograms = ["phase1_duration_seconds", "phase2_duration_seconds", "phase3_duration_seconds", "phase4_duration_seconds"];
    let latencies: HashMap<&str, serde_json::Value> = latency_histograms
        .iter()
        .map(|name| {
            let snap = state.metrics.histogram(name);
            (
                *name,
                serde_json::json!({
                    "p50_ms": snap.p50_ms,
                    "p95_ms": snap.p95_ms,
                    "p99_ms": snap.p99_ms,
                    "mean_ms": snap.mean_ms,
                    "count": snap.count,
                }),
            )
        })
        .collect();

    let body = serde_json::json!({
        "uptime_seconds": state.metrics.uptime_seconds(),
        "overall_success_rate": state.metrics.overall_success_rate(),
        "phase_success_rates": (1..=4u8).map(|p| (p, state.metrics.phase_success_rate(p))).collect::<HashMap<_, _>>(),
        "persistence_failure_rate": state.metrics.persistence_failure_rate(),
        "articles_processed_total": state.metrics.counter("articles_processed_total"),
        "fragments_processed_total": state.metrics.counter("fragments_processed_total"),
        "throughput": {
            "articles_per_hour": state.metrics.throughput_per_hour("articles_processed_total"),
            "fragments_per_hour": state.metrics.throughput_per_hour("fragments_processed_total"),
        },
        "latency_ms": latencies,
        "dependency_health": {
            "llm": breaker_label(state.llm.breaker().state()),
            "datastore": breaker_label(state.datastore.breaker().state()),
        },
        "resource_usage": {
            "active_jobs": state.jobs.active_count(),
            "worker_count": state.config.worker_count,
            "datastore_pool_size": state.config.datastore_pool_size,
        },
        "alerts": state.alerts.summary(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

pub async fn pipeline_status(State(state): State<AppState>) -> Response {
    let body = serde_json::json!({
        "llm_circuit_breaker": format!("{:?}", state.llm.breaker().state()),
        "datastore_circuit_breaker": format!("{:?}", state.datastore.breaker().state()),
        "active_jobs": state.jobs.active_count(),
        "overall_success_rate": state.metrics.overall_success_rate(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

#[derive(serde::Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    active_only: Option<bool>,
}

pub async fn list_alerts(State(state): State<AppState>, Query(query): Query<AlertsQuery>) -> Response {
    let alerts = state.alerts.list(query.active_only.unwrap_or(false));
    (StatusCode::OK, Json(alerts)).into_response()
}

pub async fn alerts_summary(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.alerts.summary())).into_response()
}

/// Fires a synthetic alert so operators can verify their alert pipeline
/// (dashboards, paging) end to end without waiting for a real threshold
/// breach.
pub async fn test_alert(State(state): State<AppState>) -> Response {
    state.alerts.fire(Alert {
        kind: "test_alert".to_string(),
        severity: Severity::Warn,
        title: "Synthetic test alert".to_string(),
        description: "Triggered via POST /monitoring/alerts/test".to_string(),
        timestamp: state.clock.system_now(),
        labels: HashMap::new(),
        annotations: HashMap::new(),
        active: true,
    });
    (StatusCode::OK, Json(serde_json::json!({"fired": true}))).into_response()
}

/// Runs one alert-evaluation tick immediately against the current
/// `MetricsCollector` snapshot and circuit breaker states, used by both the
/// background ticker and directly by tests.
pub fn evaluate_now(state: &AppState) {
    let now = Instant::now();
    let llm_open = state.llm.breaker().open_duration_secs(now);
    let datastore_open = state.datastore.breaker().open_duration_secs(now);
    state.alerts.evaluate(
        &state.metrics,
        &[("llm", llm_open), ("datastore", datastore_open)],
        state.clock.system_now(),
    );
}
