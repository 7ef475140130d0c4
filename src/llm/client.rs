//! Core decision-interface trait and errors

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse};

/// Stateless decision interface - each call receives the full transcript.
///
/// Implementations must tolerate many concurrent invocations; the pool drives
/// one call per running work item.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Provider name used in logs and registry lookups
    fn name(&self) -> &str;
}

/// Errors that can occur during a completion
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) | LlmError::Json(_) | LlmError::Other(_) => false,
        }
    }
}

/// Scripted client for tests and dry runs.
///
/// Replays queued outcomes in order. When the script runs out it returns the
/// fallback response if one is set, otherwise an `InvalidResponse` error.
pub struct MockLlmClient {
    name: String,
    script: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    fallback: Option<CompletionResponse>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    pub fn from_results(results: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self {
            name: "mock".to_string(),
            script: Mutex::new(results.into()),
            fallback: None,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Client answering every call with the same response
    pub fn always(response: CompletionResponse) -> Self {
        Self::new(Vec::new()).with_fallback(response)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_fallback(mut self, response: CompletionResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        match next {
            Some(outcome) => outcome,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::InvalidResponse("mock script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::StopReason;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            model: "mock".to_string(),
            max_tokens: 100,
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(
            LlmError::ApiError {
                status: 503,
                message: "overloaded".into()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::ApiError {
                status: 400,
                message: "bad".into()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("x".into()).is_retryable());
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[tokio::test]
    async fn test_mock_replays_script_in_order() {
        let mock = MockLlmClient::new(vec![
            CompletionResponse::end_turn("first"),
            CompletionResponse::end_turn("second"),
        ]);

        assert_eq!(mock.complete(request()).await.unwrap().content, "first");
        assert_eq!(mock.complete(request()).await.unwrap().content, "second");
        assert!(mock.complete(request()).await.is_err());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_scripted_error() {
        let mock = MockLlmClient::from_results(vec![Err(LlmError::Other("boom".into()))]);
        let err = mock.complete(request()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_mock_fallback() {
        let mock = MockLlmClient::always(CompletionResponse::end_turn("again"));
        for _ in 0..3 {
            let resp = mock.complete(request()).await.unwrap();
            assert_eq!(resp.stop_reason, StopReason::EndTurn);
            assert_eq!(resp.content, "again");
        }
    }
}
