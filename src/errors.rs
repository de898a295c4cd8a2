//! Error taxonomy for the pipeline.
//!
//! These are error *kinds*, not a transport-specific wire type — the HTTP
//! surface in `pipeline-web` maps each variant to a status code and builds
//! the `{error, detalles?, support_code?, retry_after?, request_id}` body.

use thiserror::Error;

/// A single field-validation failure, e.g. `{field: "titular", error: "required"}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed")]
    Validation { fields: Vec<FieldError> },

    #[error("LLM unavailable after {retry_count} retries (status={last_status:?}, timed_out={timed_out})")]
    LlmUnavailable {
        retry_count: u32,
        last_status: Option<u16>,
        timed_out: bool,
    },

    #[error("datastore RPC {rpc_name} failed (connection_error={is_connection_error}, pool_exhausted={pool_exhausted})")]
    DatastoreRpcError {
        rpc_name: String,
        is_connection_error: bool,
        pool_exhausted: bool,
        message: String,
    },

    #[error("processing error in phase {phase}: {message}")]
    Processing { phase: u8, message: String },

    #[error("service unavailable: {reason}")]
    ServiceUnavailable { reason: String, retry_after_secs: Option<u64> },

    #[error("cancelled: {reason}")]
    Cancelled { reason: String },
}

impl PipelineError {
    /// `ERR_PIPE_<PHASE>_<ULID>` support code; phase is `0` for errors not
    /// attributable to a specific phase (validation, dispatch-level).
    pub fn support_code(&self, phase: u8) -> String {
        format!("ERR_PIPE_{phase}_{}", uuid::Uuid::now_v7().simple())
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            PipelineError::ServiceUnavailable { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        }
    }
}

/// What drove a phase into its fallback path — passed to `fallback(..)` so
/// it can choose the right `decision`/warning text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    PreprocessingError,
    LlmError,
    TranslationError,
    RpcError,
    Cancelled,
}

impl std::fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FallbackCause::PreprocessingError => "preprocessing_error",
            FallbackCause::LlmError => "llm_error",
            FallbackCause::TranslationError => "translation_error",
            FallbackCause::RpcError => "rpc_error",
            FallbackCause::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
