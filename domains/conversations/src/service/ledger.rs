//! Message ledger: append, edit, list, soft delete

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entities::{Message, MessageMetadata};
use crate::repository::ConversationsRepositories;
use crate::service::pipeline::{CompletionScheduler, CompletionTrigger};
use chatline_common::{Error, Result};

/// Read-modify-write rounds before an edit gives up on a contended message
const EDIT_ATTEMPTS: u32 = 5;

fn message_not_found() -> Error {
    Error::NotFound("Message not found".to_string())
}

fn conversation_not_found() -> Error {
    Error::NotFound("Conversation not found".to_string())
}

#[derive(Clone)]
pub struct MessageLedger {
    repos: ConversationsRepositories,
    scheduler: Arc<dyn CompletionScheduler>,
}

impl MessageLedger {
    pub fn new(repos: ConversationsRepositories, scheduler: Arc<dyn CompletionScheduler>) -> Self {
        Self { repos, scheduler }
    }

    /// Store a user message and schedule its completion.
    ///
    /// Returns as soon as the message is stored; the reply arrives later.
    pub async fn append(
        &self,
        owner_id: Uuid,
        conversation_id: Uuid,
        content: String,
        metadata: Option<MessageMetadata>,
    ) -> Result<Message> {
        let message = Message::new_user(conversation_id, owner_id, content, metadata)?;

        self.repos
            .conversations
            .find_owned(conversation_id, owner_id)
            .await?
            .ok_or_else(conversation_not_found)?;

        let stored = self.repos.messages.create(&message).await?;

        if let Err(e) = self
            .repos
            .conversations
            .touch(conversation_id, stored.created_at)
            .await
        {
            tracing::warn!(
                error = %e,
                conversation_id = %conversation_id,
                "Failed to refresh conversation activity"
            );
        }

        let trigger = CompletionTrigger {
            conversation_id,
            owner_id,
            message_id: stored.id,
        };
        if let Err(e) = self.scheduler.schedule(trigger) {
            tracing::error!(
                error = %e,
                conversation_id = %conversation_id,
                message_id = %stored.id,
                "Completion could not be scheduled"
            );
        }

        Ok(stored)
    }

    /// Replace a message's content, recording the previous content.
    ///
    /// The write only lands if the message is unchanged since it was read;
    /// an overlapping edit causes a re-read so neither edit is lost.
    pub async fn edit(&self, owner_id: Uuid, message_id: Uuid, new_content: String) -> Result<Message> {
        if new_content.trim().is_empty() {
            return Err(Error::Validation(
                "Message content cannot be empty or whitespace-only".to_string(),
            ));
        }

        for attempt in 1..=EDIT_ATTEMPTS {
            let current = self
                .repos
                .messages
                .find_owned(message_id, owner_id)
                .await?
                .ok_or_else(message_not_found)?;

            let mut edited = current.clone();
            edited.apply_edit(new_content.clone(), Utc::now())?;

            if let Some(saved) = self.repos.messages.save_edit(&edited, &current).await? {
                return Ok(saved);
            }

            tracing::debug!(
                message_id = %message_id,
                attempt,
                "Message changed during edit, re-reading"
            );
        }

        Err(Error::Conflict(
            "Message is being edited concurrently".to_string(),
        ))
    }

    /// A conversation's messages in creation order, soft-deleted ones included
    pub async fn list(&self, owner_id: Uuid, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.repos
            .conversations
            .find_owned(conversation_id, owner_id)
            .await?
            .ok_or_else(conversation_not_found)?;

        self.repos.messages.list_by_conversation(conversation_id).await
    }

    /// Hide a message's content while keeping its place in the transcript
    pub async fn soft_delete(&self, owner_id: Uuid, message_id: Uuid) -> Result<Message> {
        let deleted = self
            .repos
            .messages
            .soft_delete(message_id, owner_id, Utc::now())
            .await?
            .ok_or_else(message_not_found)?;

        tracing::info!(message_id = %message_id, owner_id = %owner_id, "Message deleted");
        Ok(deleted)
    }
}
