//! Conversation services
//!
//! [`ConversationManager`] owns conversation lifecycle, [`MessageLedger`]
//! owns message writes, and [`CompletionPipeline`] produces assistant
//! replies in the background.

pub mod ledger;
pub mod manager;
pub mod pipeline;

pub use ledger::MessageLedger;
pub use manager::ConversationManager;
pub use pipeline::{
    CompletionOutcome, CompletionPipeline, CompletionReport, CompletionScheduler,
    CompletionTrigger, PipelineSettings, PipelineStats, PipelineStatsSnapshot, ScheduleError,
};
