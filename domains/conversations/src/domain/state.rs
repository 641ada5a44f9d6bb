//! State machine for completion runs
//!
//! One run exists per appended user message:
//! Scheduled → InFlight → {Completed, Failed}, with Scheduled → Failed
//! when the run cannot start (precondition failure).

pub use chatline_common::StateError;
use chatline_llm::LlmError;
use serde::{Deserialize, Serialize};

/// Completion run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Scheduled,
    InFlight,
    Completed,
    Failed,
}

impl CompletionState {
    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [CompletionState] {
        match self {
            Self::Scheduled => &[Self::InFlight, Self::Failed],
            Self::InFlight => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

impl std::fmt::Display for CompletionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Events that drive a completion run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionEvent {
    /// Window built; the capability call is starting
    Dispatch,
    /// Reply persisted
    Succeed,
    /// Run ended without a reply
    Fail,
}

impl std::fmt::Display for CompletionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispatch => write!(f, "dispatch"),
            Self::Succeed => write!(f, "succeed"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Completion run state machine
pub struct CompletionStateMachine;

impl CompletionStateMachine {
    /// Attempt a state transition
    pub fn transition(
        current: CompletionState,
        event: CompletionEvent,
    ) -> Result<CompletionState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        let next = match (current, event) {
            (CompletionState::Scheduled, CompletionEvent::Dispatch) => CompletionState::InFlight,
            (CompletionState::Scheduled, CompletionEvent::Fail) => CompletionState::Failed,
            (CompletionState::InFlight, CompletionEvent::Succeed) => CompletionState::Completed,
            (CompletionState::InFlight, CompletionEvent::Fail) => CompletionState::Failed,
            _ => {
                return Err(StateError::InvalidTransition {
                    from: current.to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }
}

/// Why a run ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionFailure {
    /// The capability refused the call because of rate, quota, or billing limits
    QuotaExceeded,
    /// Any other failure: network, timeout, blank reply, precondition, persistence
    GenerationError,
}

impl CompletionFailure {
    pub fn classify(error: &LlmError) -> Self {
        if error.is_quota() {
            Self::QuotaExceeded
        } else {
            Self::GenerationError
        }
    }
}

impl std::fmt::Display for CompletionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaExceeded => write!(f, "quota_exceeded"),
            Self::GenerationError => write!(f, "generation_error"),
        }
    }
}
