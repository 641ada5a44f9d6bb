//! In-process store
//!
//! Backs local runs without `DATABASE_URL` and the test suites. Implements
//! both store traits over one shared state, so clones see the same data.
//! Thread-safe via `Arc<RwLock<>>`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entities::{Conversation, Message};
use crate::repository::{ConversationStore, MessageStore};
use chatline_common::{Error, Result};

#[derive(Debug, Default)]
struct MemoryState {
    conversations: Vec<Conversation>,
    /// Insertion order doubles as creation order
    messages: Vec<Message>,
}

/// Injected failures for exercising best-effort and retry paths
#[derive(Debug, Default)]
struct Faults {
    touch: AtomicBool,
    message_deletes: AtomicU32,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `touch` fail until reset
    pub fn fail_touches(&self, fail: bool) {
        self.faults.touch.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` bulk message deletions fail
    pub fn fail_next_message_deletes(&self, count: u32) {
        self.faults.message_deletes.store(count, Ordering::SeqCst);
    }

    /// Total number of stored messages across all conversations
    pub fn message_count(&self) -> Result<usize> {
        Ok(self.read()?.messages.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| Error::Storage(format!("store lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| Error::Storage(format!("store lock poisoned: {e}")))
    }

    fn check_message_delete_fault(&self) -> Result<()> {
        let injected = self
            .faults
            .message_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::Storage("injected message delete failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create(&self, conversation: &Conversation) -> Result<Conversation> {
        self.write()?.conversations.push(conversation.clone());
        Ok(conversation.clone())
    }

    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self
            .read()?
            .conversations
            .iter()
            .find(|c| c.id == id && c.is_owned_by(owner_id))
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Conversation>> {
        let mut convs: Vec<Conversation> = self
            .read()?
            .conversations
            .iter()
            .filter(|c| c.is_owned_by(owner_id))
            .cloned()
            .collect();
        convs.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(convs)
    }

    async fn update_title(
        &self,
        id: Uuid,
        owner_id: Uuid,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        let mut state = self.write()?;
        let updated = state
            .conversations
            .iter_mut()
            .find(|c| c.id == id && c.is_owned_by(owner_id))
            .map(|c| {
                c.title = title.to_string();
                c.touch(at);
                c.clone()
            });
        Ok(updated)
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if self.faults.touch.load(Ordering::SeqCst) {
            return Err(Error::Storage("injected touch failure".to_string()));
        }
        let mut state = self.write()?;
        if let Some(conv) = state.conversations.iter_mut().find(|c| c.id == id) {
            conv.touch(at);
        }
        Ok(())
    }

    async fn delete_owned(&self, id: Uuid, owner_id: Uuid) -> Result<bool> {
        let mut state = self.write()?;
        let before = state.conversations.len();
        state
            .conversations
            .retain(|c| !(c.id == id && c.is_owned_by(owner_id)));
        Ok(state.conversations.len() < before)
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.conversations.len();
        state.conversations.retain(|c| !c.is_owned_by(owner_id));
        Ok((before - state.conversations.len()) as u64)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, message: &Message) -> Result<Message> {
        self.write()?.messages.push(message.clone());
        Ok(message.clone())
    }

    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Message>> {
        Ok(self
            .read()?
            .messages
            .iter()
            .find(|m| m.id == id && m.user_id == owner_id)
            .cloned())
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .read()?
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn save_edit(&self, edited: &Message, previous: &Message) -> Result<Option<Message>> {
        let mut state = self.write()?;
        let updated = state
            .messages
            .iter_mut()
            .find(|m| {
                m.id == edited.id
                    && m.user_id == edited.user_id
                    && !m.is_deleted()
                    && m.content == previous.content
                    && m.edited_at == previous.edited_at
            })
            .map(|m| {
                m.content = edited.content.clone();
                m.edit_history = edited.edit_history.clone();
                m.edited_at = edited.edited_at;
                m.clone()
            });
        Ok(updated)
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>> {
        let mut state = self.write()?;
        let updated = state
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.user_id == owner_id)
            .map(|m| {
                m.soft_delete(at);
                m.clone()
            });
        Ok(updated)
    }

    async fn delete_by_conversation(&self, conversation_id: Uuid) -> Result<u64> {
        self.delete_by_conversations(&[conversation_id]).await
    }

    async fn delete_by_conversations(&self, conversation_ids: &[Uuid]) -> Result<u64> {
        self.check_message_delete_fault()?;
        let mut state = self.write()?;
        let before = state.messages.len();
        state
            .messages
            .retain(|m| !conversation_ids.contains(&m.conversation_id));
        Ok((before - state.messages.len()) as u64)
    }
}
