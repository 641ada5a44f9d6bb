//! Mock LLM Service Implementation
//!
//! Used by `LlmServiceFactory` when provider is `"mock"` and by tests.
//! Replies are deterministic; tests can script replies and failures and
//! inspect every request the service received.
//! Thread-safe via `Arc<Mutex<>>`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{CompletionRequest, CompletionResponse, LlmError, LlmService};

/// What the mock does with one request
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Answer with `Mock response to: <last message>`
    Echo,
    /// Answer with fixed text
    Reply(String),
    /// Fail with the given error
    Fail(LlmError),
}

#[derive(Debug)]
struct MockState {
    default_behavior: MockBehavior,
    script: VecDeque<MockBehavior>,
    requests: Vec<CompletionRequest>,
    delay: Option<Duration>,
}

/// Mock LLM service for testing
#[derive(Debug, Clone)]
pub struct MockLlmService {
    state: Arc<Mutex<MockState>>,
}

impl MockLlmService {
    /// Create a new mock LLM service that echoes the last message
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::Echo)
    }

    /// Create a mock that applies `behavior` to every request
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                default_behavior: behavior,
                script: VecDeque::new(),
                requests: Vec::new(),
                delay: None,
            })),
        }
    }

    /// Create a mock that always answers with `text`
    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Reply(text.into()))
    }

    /// Create a mock that always fails with `error`
    pub fn failing(error: LlmError) -> Self {
        Self::with_behavior(MockBehavior::Fail(error))
    }

    /// Queue a behavior for the next unscripted request
    pub fn push_behavior(&self, behavior: MockBehavior) {
        self.lock().script.push_back(behavior);
    }

    /// Sleep this long before answering each request
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Return all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test must not hide the recorded state from others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        tracing::info!("Mock LLM service processing completion request");

        let (behavior, delay) = {
            let mut state = self
                .state
                .lock()
                .map_err(|e| LlmError::Request(format!("mock state lock poisoned: {e}")))?;
            state.requests.push(request.clone());
            let behavior = state
                .script
                .pop_front()
                .unwrap_or_else(|| state.default_behavior.clone());
            (behavior, state.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let model = if request.model.is_empty() {
            self.default_model().to_string()
        } else {
            request.model
        };

        let content = match behavior {
            MockBehavior::Fail(error) => return Err(error),
            MockBehavior::Reply(text) => text,
            MockBehavior::Echo => {
                let last_message = request
                    .messages
                    .last()
                    .map(|m| m.content.as_str())
                    .unwrap_or("empty");
                format!("Mock response to: {}", last_message)
            }
        };

        let input_tokens = request
            .messages
            .iter()
            .map(|m| m.content.len() as i32 / 4)
            .sum::<i32>();
        let output_tokens = content.len() as i32 / 4;

        Ok(CompletionResponse {
            content,
            model,
            input_tokens,
            output_tokens,
            stop_reason: "end_turn".to_string(),
        })
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }
}
