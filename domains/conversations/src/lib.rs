//! Conversations domain: chat threads, messages, and assistant replies

pub mod api;
pub mod domain;
pub mod repository;
pub mod service;

// Re-export domain types at the crate root for convenience
pub use domain::context::{ContextError, ContextWindow, GenerationSettings};
pub use domain::entities::{
    Conversation, EditEntry, EditHistory, Message, MessageMetadata, MessageRole, MessageStatus,
};
pub use domain::state::{
    CompletionEvent, CompletionFailure, CompletionState, CompletionStateMachine, StateError,
};

// Re-export repository types
pub use repository::{ConversationStore, ConversationsRepositories, MemoryStore, MessageStore};

// Re-export service types
pub use service::{
    CompletionOutcome, CompletionPipeline, CompletionReport, CompletionScheduler,
    CompletionTrigger, ConversationManager, MessageLedger, PipelineSettings,
    PipelineStatsSnapshot, ScheduleError,
};

// Re-export API types
pub use api::routes;
pub use api::ConversationsState;
