//! Conversation lifecycle: create, list, rename, delete

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entities::Conversation;
use crate::repository::ConversationsRepositories;
use chatline_common::{Error, Result};

/// Base delay between attempts of the message phase of a delete
const DELETE_RETRY_BACKOFF: Duration = Duration::from_millis(50);

fn not_found() -> Error {
    Error::NotFound("Conversation not found".to_string())
}

#[derive(Clone)]
pub struct ConversationManager {
    repos: ConversationsRepositories,
    delete_retry_attempts: u32,
}

impl ConversationManager {
    pub fn new(repos: ConversationsRepositories, delete_retry_attempts: u32) -> Self {
        Self {
            repos,
            delete_retry_attempts: delete_retry_attempts.max(1),
        }
    }

    pub async fn create(&self, owner_id: Uuid, title: Option<String>) -> Result<Conversation> {
        let conversation = Conversation::new(Some(owner_id), title)?;
        let created = self.repos.conversations.create(&conversation).await?;
        tracing::info!(conversation_id = %created.id, owner_id = %owner_id, "Conversation created");
        Ok(created)
    }

    /// Owner's conversations, most recently active first
    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<Conversation>> {
        self.repos.conversations.list_by_owner(owner_id).await
    }

    pub async fn get(&self, owner_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        self.repos
            .conversations
            .find_owned(conversation_id, owner_id)
            .await?
            .ok_or_else(not_found)
    }

    pub async fn rename(
        &self,
        owner_id: Uuid,
        conversation_id: Uuid,
        new_title: &str,
    ) -> Result<Conversation> {
        let title = Conversation::validate_title(new_title)?;

        self.repos
            .conversations
            .update_title(conversation_id, owner_id, &title, Utc::now())
            .await?
            .ok_or_else(not_found)
    }

    /// Delete a conversation and all of its messages, messages first
    pub async fn delete(&self, owner_id: Uuid, conversation_id: Uuid) -> Result<()> {
        self.get(owner_id, conversation_id).await?;

        let removed = self.purge_messages(&[conversation_id]).await?;

        if !self
            .repos
            .conversations
            .delete_owned(conversation_id, owner_id)
            .await?
        {
            // Deleted concurrently by another request
            return Err(not_found());
        }

        tracing::info!(
            conversation_id = %conversation_id,
            owner_id = %owner_id,
            messages_removed = removed,
            "Conversation deleted"
        );
        Ok(())
    }

    /// Delete every conversation of the owner; returns how many were removed
    pub async fn clear_all(&self, owner_id: Uuid) -> Result<u64> {
        let ids: Vec<Uuid> = self
            .repos
            .conversations
            .list_by_owner(owner_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let removed_messages = self.purge_messages(&ids).await?;
        let removed = self.repos.conversations.delete_by_owner(owner_id).await?;

        tracing::info!(
            owner_id = %owner_id,
            conversations_removed = removed,
            messages_removed = removed_messages,
            "Conversations cleared"
        );
        Ok(removed)
    }

    /// Remove messages of the given conversations, retrying with linear backoff
    async fn purge_messages(&self, conversation_ids: &[Uuid]) -> Result<u64> {
        let mut attempt = 1;
        loop {
            let result = match conversation_ids {
                [id] => self.repos.messages.delete_by_conversation(*id).await,
                ids => self.repos.messages.delete_by_conversations(ids).await,
            };

            match result {
                Ok(removed) => return Ok(removed),
                Err(e) if attempt < self.delete_retry_attempts => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        conversations = conversation_ids.len(),
                        "Message deletion failed, retrying"
                    );
                    tokio::time::sleep(DELETE_RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Message deletion failed, conversation kept"
                    );
                    return Err(e);
                }
            }
        }
    }
}
