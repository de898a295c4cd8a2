//! Wraps a raw adapter transport with the three policies both external
//! adapters require: timeout, bounded retry with backoff, and a circuit
//! breaker. The phase implementations call through these wrappers, never
//! the raw transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::{
    ChatCompletionRequest, ChatCompletionResponse, DatastoreCallError, DatastoreClient, InsertCounts,
    LlmCallError, LlmClient, SimilarEntityMatch,
};
use crate::circuit_breaker::{Admission, CircuitBreaker};
use crate::errors::PipelineError;
use crate::retry::{retry_with_backoff, Retryable, RetryPolicy};
use serde_json::Value;

impl Retryable for LlmCallError {
    fn is_retryable(&self) -> bool {
        LlmCallError::is_retryable(self)
    }
}

impl Retryable for DatastoreCallError {
    fn is_retryable(&self) -> bool {
        DatastoreCallError::is_retryable(self)
    }
}

pub struct ResilientLlmClient {
    inner: Arc<dyn LlmClient>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl ResilientLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, failure_threshold: u32, open_duration: Duration, timeout: Duration) -> Self {
        ResilientLlmClient {
            inner,
            breaker: CircuitBreaker::new("llm", failure_threshold, open_duration),
            timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, PipelineError> {
        match self.breaker.admit(Instant::now()) {
            Admission::FailFast => {
                return Err(PipelineError::ServiceUnavailable {
                    reason: "llm circuit breaker open".into(),
                    retry_after_secs: Some(self.breaker_open_remaining_secs()),
                });
            }
            Admission::Admitted | Admission::Probe => {}
        }

        let timeout = self.timeout;
        let inner = &self.inner;
        let result = retry_with_backoff(&RetryPolicy::LLM, |_attempt| {
            let inner = inner.clone();
            let request = request.clone();
            async move {
                match tokio::time::timeout(timeout, inner.complete(request)).await {
                    Ok(r) => r,
                    Err(_) => Err(LlmCallError::Timeout),
                }
            }
        })
        .await;

        match result {
            Ok((response, _retries)) => {
                self.breaker.on_success();
                Ok(response)
            }
            Err(e) => {
                self.breaker.on_failure(Instant::now());
                Err(PipelineError::LlmUnavailable {
                    retry_count: RetryPolicy::LLM.max_retries,
                    last_status: match e {
                        LlmCallError::ServerError(s) | LlmCallError::ClientError(s) => Some(s),
                        _ => None,
                    },
                    timed_out: matches!(e, LlmCallError::Timeout),
                })
            }
        }
    }

    pub async fn complete_json(&self, request: ChatCompletionRequest) -> Result<Value, PipelineError> {
        let response = self.complete(request).await?;
        serde_json::from_str(&response.text).map_err(|_| PipelineError::Processing {
            phase: 0,
            message: "LLM returned malformed JSON".into(),
        })
    }

    fn breaker_open_remaining_secs(&self) -> u64 {
        30
    }
}

pub struct ResilientDatastoreClient {
    inner: Arc<dyn DatastoreClient>,
    breaker: CircuitBreaker,
    timeout: Duration,
    pool: Arc<tokio::sync::Semaphore>,
    pool_wait: Duration,
}

impl ResilientDatastoreClient {
    pub fn new(
        inner: Arc<dyn DatastoreClient>,
        failure_threshold: u32,
        open_duration: Duration,
        timeout: Duration,
        pool_size: usize,
        pool_wait: Duration,
    ) -> Self {
        ResilientDatastoreClient {
            inner,
            breaker: CircuitBreaker::new("datastore", failure_threshold, open_duration),
            timeout,
            pool: Arc::new(tokio::sync::Semaphore::new(pool_size)),
            pool_wait,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn acquire_permit(&self) -> Result<tokio::sync::OwnedSemaphorePermit, PipelineError> {
        match tokio::time::timeout(self.pool_wait, self.pool.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            _ => Err(PipelineError::DatastoreRpcError {
                rpc_name: "acquire_connection".into(),
                is_connection_error: false,
                pool_exhausted: true,
                message: "connection pool exhausted".into(),
            }),
        }
    }

    pub async fn find_similar_entity(
        &self,
        name: &str,
        entity_type: &str,
        threshold: f32,
    ) -> Result<Vec<SimilarEntityMatch>, PipelineError> {
        let _permit = self.acquire_permit().await?;
        self.call("find_similar_entity", || {
            let inner = self.inner.clone();
            let name = name.to_string();
            let entity_type = entity_type.to_string();
            async move { inner.find_similar_entity(&name, &entity_type, threshold).await }
        })
        .await
    }

    pub async fn insert_whole_fragment(&self, payload: Value) -> Result<InsertCounts, PipelineError> {
        let _permit = self.acquire_permit().await?;
        self.call("insert_whole_fragment", || {
            let inner = self.inner.clone();
            let payload = payload.clone();
            async move { inner.insert_whole_fragment(payload).await }
        })
        .await
    }

    async fn call<T, F, Fut>(&self, rpc_name: &str, make_call: F) -> Result<T, PipelineError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, DatastoreCallError>>,
    {
        match self.breaker.admit(Instant::now()) {
            Admission::FailFast => {
                return Err(PipelineError::ServiceUnavailable {
                    reason: format!("datastore circuit breaker open ({rpc_name})"),
                    retry_after_secs: Some(30),
                });
            }
            Admission::Admitted | Admission::Probe => {}
        }

        let timeout = self.timeout;
        let result = retry_with_backoff(&RetryPolicy::DATASTORE_CONNECTION, |_attempt| {
            let fut = make_call();
            async move {
                match tokio::time::timeout(timeout, fut).await {
                    Ok(r) => r,
                    Err(_) => Err(DatastoreCallError::ConnectionError),
                }
            }
        })
        .await;

        match result {
            Ok((value, _retries)) => {
                self.breaker.on_success();
                Ok(value)
            }
            Err(e) => {
                self.breaker.on_failure(Instant::now());
                Err(PipelineError::DatastoreRpcError {
                    rpc_name: rpc_name.to_string(),
                    is_connection_error: matches!(e, DatastoreCallError::ConnectionError),
                    pool_exhausted: false,
                    message: format!("{e:?}"),
                })
            }
        }
    }
}
