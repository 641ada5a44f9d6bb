//! Conversations domain layer: entities, completion state machine, context window

pub mod context;
pub mod entities;
pub mod state;
