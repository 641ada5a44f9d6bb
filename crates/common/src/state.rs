//! State machine error types
//!
//! Used by the completion run lifecycle and any other state machine in the workspace.

use thiserror::Error;

/// Errors that can occur during state transitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Invalid transition: cannot apply {event} in state {from}")]
    InvalidTransition { from: String, event: String },

    #[error("Terminal state: {0} accepts no further events")]
    TerminalState(String),
}
