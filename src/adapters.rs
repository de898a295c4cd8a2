//! Adapter trait seams. `pipeline-core` depends only on these traits;
//! `pipeline-llm` and `pipeline-datastore` provide the concrete transports,
//! and tests provide in-memory mocks with injected-transport test hooks
//! instead of monkey-patched singletons.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ChatCompletionRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionResponse {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmCallError {
    RateLimited,
    TransientConnection,
    ServerError(u16),
    ClientError(u16),
    Timeout,
    MalformedResponse,
}

impl LlmCallError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmCallError::RateLimited | LlmCallError::TransientConnection | LlmCallError::ServerError(_)
        )
    }
}

/// Single chat-completion call shape. The pipeline never interprets the
/// prompt content itself; it only parses the returned JSON text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmCallError>;

    /// Convenience: call then parse the response text as JSON, counting
    /// non-JSON/malformed JSON as a phase failure.
    async fn complete_json(&self, request: ChatCompletionRequest) -> Result<Value, LlmCallError> {
        let response = self.complete(request).await?;
        serde_json::from_str(&response.text).map_err(|_| LlmCallError::MalformedResponse)
    }
}

#[derive(Debug, Clone)]
pub struct SimilarEntityMatch {
    pub id: String,
    pub normalized_name: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatastoreCallError {
    ConnectionError,
    ValidationError,
    PoolExhausted,
}

impl DatastoreCallError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatastoreCallError::ConnectionError)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct InsertCounts {
    pub facts: usize,
    pub entities: usize,
    pub quotes: usize,
    pub data: usize,
    pub relations: usize,
}

/// RPC-style datastore adapter: exactly two operations, both opaque to the
/// schema the datastore actually uses.
#[async_trait]
pub trait DatastoreClient: Send + Sync {
    async fn find_similar_entity(
        &self,
        name: &str,
        entity_type: &str,
        threshold: f32,
    ) -> Result<Vec<SimilarEntityMatch>, DatastoreCallError>;

    async fn insert_whole_fragment(&self, payload: Value) -> Result<InsertCounts, DatastoreCallError>;
}
