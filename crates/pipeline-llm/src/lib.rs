//! `pipeline-llm`: a `reqwest`-based implementation of
//! `pipeline_core::adapters::LlmClient` — a generic Authorization-bearer
//! chat-completion POST against a single hosted provider, kept
//! provider-generic rather than hardcoding one vendor's request shape.
//!
//! Also exposes [`MockLlmClient`], an in-memory test double with injected
//! scripted responses/failure sequences, so tests control behavior
//! directly instead of monkey-patching a mock service's attributes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pipeline_core::adapters::{ChatCompletionRequest, ChatCompletionResponse, LlmCallError, LlmClient};

/// Talks to a single hosted chat-completion endpoint (`LLM_ENDPOINT`) with
/// bearer auth (`LLM_API_KEY`), in the OpenAI-compatible
/// `{choices:[{message:{content}}]}` response shape most hosted providers
/// (including Groq, which the original implementation targeted) share.
#[derive(Clone)]
pub struct HttpLlmClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(endpoint: String, api_key: String, model: String) -> Self {
        HttpLlmClient { endpoint, api_key, model, client: reqwest::Client::new() }
    }

    pub fn from_config(endpoint: &str, api_key: &str) -> Self {
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string());
        Self::new(endpoint.to_string(), api_key.to_string(), model)
    }
}

#[derive(serde::Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmCallError> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.prompt},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(endpoint = %self.endpoint, "llm request timed out");
                    LlmCallError::Timeout
                } else {
                    tracing::warn!(endpoint = %self.endpoint, error = %e, "llm request failed to connect");
                    LlmCallError::TransientConnection
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(endpoint = %self.endpoint, "llm request rate limited");
            return Err(LlmCallError::RateLimited);
        }
        if status.is_server_error() {
            tracing::warn!(endpoint = %self.endpoint, status = status.as_u16(), "llm request returned server error");
            return Err(LlmCallError::ServerError(status.as_u16()));
        }
        if status.is_client_error() {
            tracing::warn!(endpoint = %self.endpoint, status = status.as_u16(), "llm request returned client error");
            return Err(LlmCallError::ClientError(status.as_u16()));
        }

        let parsed: ChatResponseBody = response.json().await.map_err(|e| {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "llm response body did not match expected shape");
            LlmCallError::MalformedResponse
        })?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmCallError::MalformedResponse)?;

        Ok(ChatCompletionResponse { text })
    }
}

/// Fixed sequence of scripted outcomes played back one per call, then the
/// last entry repeats. Lets adapter-contract and controller tests drive
/// exact retry/circuit-breaker/fallback scenarios without a real network.
pub struct MockLlmClient {
    script: Mutex<Vec<Result<String, LlmCallError>>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(script: Vec<Result<String, LlmCallError>>) -> Self {
        MockLlmClient { script: Mutex::new(script), calls: AtomicUsize::new(0) }
    }

    pub fn always(response: Result<String, LlmCallError>) -> Self {
        MockLlmClient::new(vec![response])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmCallError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        let entry = script.get(idx).or_else(|| script.last()).cloned().unwrap_or(Ok(String::new()));
        entry.map(|text| ChatCompletionResponse { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_plays_back_script_then_repeats_last() {
        let mock = MockLlmClient::new(vec![
            Err(LlmCallError::ServerError(500)),
            Ok("{}".to_string()),
        ]);
        assert!(mock.complete(request()).await.is_err());
        assert!(mock.complete(request()).await.is_ok());
        assert!(mock.complete(request()).await.is_ok()); // repeats last
        assert_eq!(mock.call_count(), 3);
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            system_prompt: "test".to_string(),
            prompt: "test".to_string(),
            max_tokens: 10,
            temperature: 0.0,
        }
    }
}
