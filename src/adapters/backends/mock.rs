//! Mock scorer backend for testing.
//!
//! Responses are scripted per scorer name: each invocation pops the next
//! scripted response, so tests can exercise the corrective-retry path
//! (malformed then valid) and terminal failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::ports::{BackendResponse, ScorerBackend};

/// One scripted backend reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text with the given token counts.
    Text { body: String, input_tokens: u64, output_tokens: u64 },
    /// Fail with a transient backend error (timeout/throttle).
    BackendError(String),
}

impl MockReply {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into(), input_tokens: 1_000, output_tokens: 500 }
    }

    pub fn text_with_tokens(body: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self::Text { body: body.into(), input_tokens, output_tokens }
    }

    /// A well-formed scorer JSON payload for `scorer`.
    pub fn valid_score(raw_score: f64, confidence: f64) -> Self {
        Self::text(format!(
            r#"{{"raw_score": {raw_score}, "confidence": {confidence}, "evidence": [], "strengths": ["clean layout"], "improvements": ["add tests"]}}"#
        ))
    }
}

/// Scripted mock backend. Invocations are keyed by the scorer name embedded
/// in the system prompt via [`MockBackend::script`].
#[derive(Default)]
pub struct MockBackend {
    scripts: Mutex<HashMap<String, Vec<MockReply>>>,
    invocations: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for invocations whose system prompt contains `marker`.
    pub async fn script(&self, marker: impl Into<String>, replies: Vec<MockReply>) {
        let mut scripts = self.scripts.lock().await;
        let mut queue = replies;
        // Stored reversed so pop() yields replies in scripted order.
        queue.reverse();
        scripts.insert(marker.into(), queue);
    }

    /// System prompts of every invocation, in call order.
    pub async fn invocation_log(&self) -> Vec<String> {
        self.invocations.lock().await.clone()
    }
}

#[async_trait]
impl ScorerBackend for MockBackend {
    async fn invoke(
        &self,
        system_prompt: &str,
        _context: &str,
        _model: &str,
    ) -> DomainResult<BackendResponse> {
        self.invocations.lock().await.push(system_prompt.to_string());

        let mut scripts = self.scripts.lock().await;
        let reply = scripts
            .iter_mut()
            .find(|(marker, _)| system_prompt.contains(marker.as_str()))
            .and_then(|(_, queue)| queue.pop());

        match reply {
            Some(MockReply::Text { body, input_tokens, output_tokens }) => {
                Ok(BackendResponse { text: body, input_tokens, output_tokens })
            }
            Some(MockReply::BackendError(message)) => Err(OrchestratorError::ScorerBackend {
                scorer: "mock".to_string(),
                message,
            }),
            None => Err(OrchestratorError::ScorerBackend {
                scorer: "mock".to_string(),
                message: "no scripted reply".to_string(),
            }),
        }
    }
}
