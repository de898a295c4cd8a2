//! HTTP surface for the news-processing pipeline (spec.md §4.5/§4.6):
//! wires the resilient LLM/datastore adapters, the phase controller, the
//! job tracker, metrics, and alerting into one `axum` app, then runs the
//! background sweeper/alert ticks alongside the server.

mod dispatch;
mod error_response;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use pipeline_core::alerts::AlertManager;
use pipeline_core::clock::SystemClock;
use pipeline_core::config::PipelineConfig;
use pipeline_core::controller::Controller;
use pipeline_core::jobs::JobTracker;
use pipeline_core::metrics::MetricsCollector;
use pipeline_core::resilience::{ResilientDatastoreClient, ResilientLlmClient};
use pipeline_core::validation::ValidationConfig;
use pipeline_datastore::GrpcDatastoreClient;
use pipeline_llm::HttpLlmClient;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pipeline_web={0},pipeline_core={0},tower_http=info", PipelineConfig::log_level()).into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("starting pipeline-web");

    let config = Arc::new(PipelineConfig::from_env()?);
    let clock = Arc::new(SystemClock) as Arc<dyn pipeline_core::clock::Clock>;
    let metrics = Arc::new(MetricsCollector::new());
    let alerts = Arc::new(AlertManager::new());
    let jobs = Arc::new(JobTracker::new());
    let validation = Arc::new(ValidationConfig::from_env());

    let llm_adapter = Arc::new(HttpLlmClient::from_config(&config.llm_endpoint, &config.llm_api_key));
    let llm = Arc::new(ResilientLlmClient::new(
        llm_adapter,
        config.breaker_failure_threshold,
        config.breaker_open_duration,
        config.llm_timeout,
    ));

    let datastore_adapter = Arc::new(GrpcDatastoreClient::connect_lazy(config.datastore_url.clone())?);
    let datastore = Arc::new(ResilientDatastoreClient::new(
        datastore_adapter,
        config.breaker_failure_threshold,
        config.breaker_open_duration,
        config.datastore_timeout,
        config.datastore_pool_size,
        config.datastore_pool_wait,
    ));

    let controller = Arc::new(Controller::new(
        llm.clone(),
        datastore.clone(),
        metrics.clone(),
        clock.clone(),
        config.normalization_similarity_threshold,
    ));

    let state = AppState {
        config: config.clone(),
        validation,
        controller,
        jobs: jobs.clone(),
        metrics: metrics.clone(),
        alerts: alerts.clone(),
        llm,
        datastore,
        clock: clock.clone(),
        ready: Arc::new(AtomicBool::new(false)),
    };

    spawn_job_sweeper(state.clone());
    spawn_alert_ticker(state.clone());
    state.mark_ready();

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/procesar_articulo", post(routes::process::procesar_articulo))
        .route("/procesar_fragmento", post(routes::process::procesar_fragmento))
        .route("/status/:job_id", get(routes::status::get_job_status))
        .route("/health", get(routes::health::health))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/metrics", get(routes::monitoring::metrics_prometheus))
        .route("/monitoring/dashboard", get(routes::monitoring::dashboard))
        .route("/monitoring/pipeline-status", get(routes::monitoring::pipeline_status))
        .route("/monitoring/alerts", get(routes::monitoring::list_alerts))
        .route("/monitoring/alerts/summary", get(routes::monitoring::alerts_summary))
        .route("/monitoring/alerts/test", post(routes::monitoring::test_alert))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let port: u16 = std::env::var("SERVER_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "pipeline-web listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining");
}

/// Evicts job entries past their retention window, per `JobTracker::sweep`
/// (spec.md §4.4), on the interval configured by `JOB_SWEEP_INTERVAL_SECONDS`.
fn spawn_job_sweeper(state: AppState) {
    tokio::spawn(async move {
        let retention = chrono::Duration::seconds(state.config.job_retention_seconds as i64);
        let mut interval = tokio::time::interval(Duration::from_secs(state.config.job_sweep_interval_seconds));
        loop {
            interval.tick().await;
            let evicted = state.jobs.sweep(retention, chrono::Utc::now());
            if evicted > 0 {
                tracing::debug!(evicted, "job sweep evicted stale entries");
            }
        }
    });
}

/// Runs the default alert rule set (spec.md §4.6) against the current
/// metrics snapshot and circuit breaker states on a fixed tick.
fn spawn_alert_ticker(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.alert_tick_interval);
        loop {
            interval.tick().await;
            routes::monitoring::evaluate_now(&state);
        }
    });
}
