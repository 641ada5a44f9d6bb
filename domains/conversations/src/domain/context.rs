//! Context window construction
//!
//! Turns a conversation transcript into the bounded prompt history sent to
//! the completion capability. Pure: the same transcript always yields the
//! same window.

use chatline_llm::{CompletionRequest, LlmMessage, LlmRole};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{Message, MessageRole};

/// Number of most recent messages included in a window
pub const CONTEXT_WINDOW_SIZE: usize = 10;

/// Fixed instruction establishing assistant behavior
pub const SYSTEM_PREAMBLE: &str = "You are a helpful assistant. Keep responses concise.";

/// Reasons a transcript cannot be completed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    #[error("transcript is empty")]
    EmptyTranscript,

    #[error("last message is from {0}, not the user")]
    TrailingTurnNotUser(MessageRole),

    #[error("triggering message {0} is not in the transcript")]
    TriggerNotFound(Uuid),
}

/// Sampling parameters applied to every completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            temperature: 0.7,
        }
    }
}

/// Bounded, role-normalized slice of a transcript
#[derive(Debug, Clone, PartialEq)]
pub struct ContextWindow {
    pub preamble: &'static str,
    pub turns: Vec<LlmMessage>,
}

impl ContextWindow {
    /// Build a window from the last [`CONTEXT_WINDOW_SIZE`] messages of `transcript`
    pub fn build(transcript: &[Message]) -> Result<Self, ContextError> {
        let last = transcript.last().ok_or(ContextError::EmptyTranscript)?;
        if last.role != MessageRole::User {
            return Err(ContextError::TrailingTurnNotUser(last.role));
        }

        let start = transcript.len().saturating_sub(CONTEXT_WINDOW_SIZE);
        let turns = transcript[start..]
            .iter()
            .map(|m| LlmMessage {
                role: normalize_role(m.role),
                content: m.content.clone(),
            })
            .collect();

        Ok(Self {
            preamble: SYSTEM_PREAMBLE,
            turns,
        })
    }

    /// Build the window as seen by one trigger: the transcript up to and including it.
    ///
    /// Replies to other triggers that landed later are outside this snapshot.
    pub fn for_trigger(transcript: &[Message], trigger_id: Uuid) -> Result<Self, ContextError> {
        let end = transcript
            .iter()
            .position(|m| m.id == trigger_id)
            .ok_or(ContextError::TriggerNotFound(trigger_id))?;
        Self::build(&transcript[..=end])
    }

    /// Convert into a provider request using the service's default model
    pub fn into_request(self, settings: GenerationSettings) -> CompletionRequest {
        CompletionRequest {
            model: String::new(),
            system_prompt: Some(self.preamble.to_string()),
            messages: self.turns,
            max_tokens: Some(settings.max_tokens),
            temperature: Some(settings.temperature),
        }
    }
}

fn normalize_role(role: MessageRole) -> LlmRole {
    match role {
        MessageRole::User => LlmRole::User,
        MessageRole::Assistant => LlmRole::Assistant,
    }
}
