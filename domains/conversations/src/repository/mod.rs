//! Repository implementations for Conversations domain
//!
//! The store is reached only through [`ConversationStore`] and [`MessageStore`].
//! Every mutation touches a single record; no multi-record transactions are used.

pub mod conversations;
pub mod memory;
pub mod messages;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{Conversation, Message};
use chatline_common::Result;

pub use conversations::PgConversationStore;
pub use memory::MemoryStore;
pub use messages::PgMessageStore;

/// Conversation persistence
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a new conversation
    async fn create(&self, conversation: &Conversation) -> Result<Conversation>;

    /// Find a conversation matching both id and owner
    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Conversation>>;

    /// List an owner's conversations, most recently active first
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Conversation>>;

    /// Set the title of an owned conversation, returning the updated record
    async fn update_title(
        &self,
        id: Uuid,
        owner_id: Uuid,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>>;

    /// Advance `updated_at` to `at` unless it is already later
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Delete an owned conversation
    async fn delete_owned(&self, id: Uuid, owner_id: Uuid) -> Result<bool>;

    /// Delete every conversation of an owner
    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<u64>;
}

/// Message persistence
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a new message
    async fn create(&self, message: &Message) -> Result<Message>;

    /// Find a message matching both id and owner
    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Message>>;

    /// List a conversation's messages in creation order
    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    /// Persist an edit (content, history, edited_at) built from `previous`.
    ///
    /// Writes nothing and returns `None` when the stored message no longer
    /// matches `previous` or was deleted meanwhile.
    async fn save_edit(&self, edited: &Message, previous: &Message) -> Result<Option<Message>>;

    /// Overwrite an owned message with the deleted sentinel
    async fn soft_delete(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>>;

    /// Remove every message of a conversation
    async fn delete_by_conversation(&self, conversation_id: Uuid) -> Result<u64>;

    /// Remove every message of several conversations
    async fn delete_by_conversations(&self, conversation_ids: &[Uuid]) -> Result<u64>;
}

/// Combined repository access for the Conversations domain
#[derive(Clone)]
pub struct ConversationsRepositories {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
}

impl ConversationsRepositories {
    /// PostgreSQL-backed repositories
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            conversations: Arc::new(PgConversationStore::new(pool.clone())),
            messages: Arc::new(PgMessageStore::new(pool)),
        }
    }

    /// In-process repositories sharing one [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        Self {
            conversations: Arc::new(store.clone()),
            messages: Arc::new(store),
        }
    }
}
