//! Environment-driven configuration, loaded once at startup. Fails fast on
//! missing required variables rather than defaulting secrets.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub llm_api_key: String,
    pub llm_endpoint: String,
    pub datastore_url: String,
    pub datastore_key: String,

    pub sync_max_bytes_article: usize,
    pub sync_max_bytes_fragment: usize,

    pub worker_count: usize,
    pub job_retention_seconds: u64,
    pub job_sweep_interval_seconds: u64,

    pub llm_timeout: Duration,
    pub datastore_timeout: Duration,
    pub datastore_pool_size: usize,
    pub datastore_pool_wait: Duration,

    pub breaker_failure_threshold: u32,
    pub breaker_open_duration: Duration,

    pub sync_request_deadline: Duration,

    pub normalization_similarity_threshold: f32,

    pub metrics_tick_interval: Duration,
    pub alert_tick_interval: Duration,

    /// Directory `/health/detailed`'s filesystem check writes its probe
    /// file into.
    pub scratch_dir: String,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Loads from the process environment (optionally populated by a
    /// `.env` file via `dotenvy`, as `forge`/`ob-poc` do at startup).
    /// Fails fast if a required variable is absent.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let llm_api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| anyhow::anyhow!("LLM_API_KEY is required"))?;
        let llm_endpoint = std::env::var("LLM_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("LLM_ENDPOINT is required"))?;
        let datastore_url = std::env::var("DATASTORE_URL")
            .map_err(|_| anyhow::anyhow!("DATASTORE_URL is required"))?;
        let datastore_key = std::env::var("DATASTORE_KEY")
            .map_err(|_| anyhow::anyhow!("DATASTORE_KEY is required"))?;

        let worker_count = env_parse(
            "WORKER_COUNT",
            std::cmp::min(32, 4 * std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)),
        );

        Ok(PipelineConfig {
            llm_api_key,
            llm_endpoint,
            datastore_url,
            datastore_key,
            sync_max_bytes_article: env_parse("SYNC_MAX_BYTES_ARTICLE", 10 * 1024),
            sync_max_bytes_fragment: env_parse("SYNC_MAX_BYTES_FRAGMENT", 5 * 1024),
            worker_count,
            job_retention_seconds: env_parse("JOB_RETENTION_SECONDS", 24 * 3600),
            job_sweep_interval_seconds: env_parse("JOB_SWEEP_INTERVAL_SECONDS", 60),
            llm_timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECONDS", 30)),
            datastore_timeout: Duration::from_secs(env_parse("DATASTORE_TIMEOUT_SECONDS", 10)),
            datastore_pool_size: env_parse("DATASTORE_POOL_SIZE", 10),
            datastore_pool_wait: Duration::from_millis(env_parse("DATASTORE_POOL_WAIT_MS", 200)),
            breaker_failure_threshold: env_parse("BREAKER_FAILURE_THRESHOLD", 5),
            breaker_open_duration: Duration::from_secs(env_parse("BREAKER_OPEN_SECONDS", 30)),
            sync_request_deadline: Duration::from_secs(env_parse("SYNC_REQUEST_DEADLINE_SECONDS", 60)),
            normalization_similarity_threshold: env_parse("NORMALIZATION_SIMILARITY_THRESHOLD", 0.85),
            metrics_tick_interval: Duration::from_secs(env_parse("METRICS_TICK_SECONDS", 30)),
            alert_tick_interval: Duration::from_secs(env_parse("ALERT_TICK_SECONDS", 30)),
            scratch_dir: env_or("SCRATCH_DIR", std::env::temp_dir().to_string_lossy().as_ref()),
        })
    }

    pub fn log_level() -> String {
        env_or("LOG_LEVEL", "info")
    }
}
