//! Conversations domain state

use std::sync::Arc;

use crate::repository::ConversationsRepositories;
use crate::service::{CompletionScheduler, ConversationManager, MessageLedger};

/// Application state for the Conversations domain
#[derive(Clone)]
pub struct ConversationsState {
    pub conversations: ConversationManager,
    pub messages: MessageLedger,
}

impl ConversationsState {
    pub fn new(
        repos: ConversationsRepositories,
        scheduler: Arc<dyn CompletionScheduler>,
        delete_retry_attempts: u32,
    ) -> Self {
        Self {
            conversations: ConversationManager::new(repos.clone(), delete_retry_attempts),
            messages: MessageLedger::new(repos, scheduler),
        }
    }
}
