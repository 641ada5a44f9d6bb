//! Domain entities for Conversations domain
//!
//! Conversations own an ordered transcript of messages. Messages are
//! append-only: content may be edited (with a bounded history) or
//! soft-deleted, but rows are only removed when their conversation is.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatline_common::{Error, Result};

/// Title given to conversations created without one
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum title string length (varchar(200))
const MAX_TITLE_LENGTH: usize = 200;

/// Number of prior contents retained per message
pub const EDIT_HISTORY_CAPACITY: usize = 10;

/// Content written over a soft-deleted message
pub const DELETED_CONTENT: &str = "[Message deleted]";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Message delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    #[default]
    Delivered,
    Read,
    Failed,
    Deleted,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Sending => write!(f, "sending"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
            MessageStatus::Failed => write!(f, "failed"),
            MessageStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Presentation hint attached to a message (stored as JSONB, tagged by `type`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageMetadata {
    #[default]
    Text,
    Image {
        url: String,
    },
    Link {
        url: String,
    },
    Code {
        language: String,
    },
    Deleted,
}

impl MessageMetadata {
    /// Validate caller-supplied metadata
    pub fn validate(&self) -> Result<()> {
        match self {
            MessageMetadata::Image { url } | MessageMetadata::Link { url } => {
                if url.trim().is_empty() {
                    return Err(Error::Validation(
                        "Metadata url cannot be empty".to_string(),
                    ));
                }
            }
            MessageMetadata::Code { language } => {
                if language.trim().is_empty() {
                    return Err(Error::Validation(
                        "Metadata language cannot be empty".to_string(),
                    ));
                }
            }
            MessageMetadata::Deleted => {
                return Err(Error::Validation(
                    "Metadata type 'deleted' is reserved".to_string(),
                ));
            }
            MessageMetadata::Text => {}
        }
        Ok(())
    }
}

/// One superseded message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEntry {
    pub content: String,
    pub edited_at: DateTime<Utc>,
}

/// Fixed-capacity FIFO of prior contents, oldest first.
///
/// Serialized as a plain JSON array. Arrays longer than the capacity keep
/// only their newest entries when decoded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<EditEntry>", into = "Vec<EditEntry>")]
pub struct EditHistory(VecDeque<EditEntry>);

impl EditHistory {
    pub fn new() -> Self {
        Self(VecDeque::with_capacity(EDIT_HISTORY_CAPACITY))
    }

    /// Append an entry, evicting the oldest one when full
    pub fn push(&mut self, entry: EditEntry) {
        if self.0.len() == EDIT_HISTORY_CAPACITY {
            self.0.pop_front();
        }
        self.0.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EditEntry> {
        self.0.iter()
    }

    pub fn latest(&self) -> Option<&EditEntry> {
        self.0.back()
    }
}

impl From<Vec<EditEntry>> for EditHistory {
    fn from(entries: Vec<EditEntry>) -> Self {
        let skip = entries.len().saturating_sub(EDIT_HISTORY_CAPACITY);
        Self(entries.into_iter().skip(skip).collect())
    }
}

impl From<EditHistory> for Vec<EditEntry> {
    fn from(history: EditHistory) -> Self {
        history.0.into()
    }
}

/// Conversation entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation; a missing or blank title becomes "New Chat"
    pub fn new(user_id: Option<Uuid>, title: Option<String>) -> Result<Self> {
        let title = match title {
            Some(t) if !t.trim().is_empty() => Self::validate_title(&t)?,
            _ => DEFAULT_TITLE.to_string(),
        };

        let now = Utc::now();
        Ok(Conversation {
            id: Uuid::new_v4(),
            user_id,
            title,
            created_at: now,
            updated_at: now,
        })
    }

    /// Validate a caller-supplied title and return its trimmed form
    pub fn validate_title(title: &str) -> Result<String> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("Title is required".to_string()));
        }
        if trimmed.chars().count() > MAX_TITLE_LENGTH {
            return Err(Error::Validation(format!(
                "Title must be at most {} characters",
                MAX_TITLE_LENGTH
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Advance `updated_at`; never moves it backwards
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }

    pub fn is_owned_by(&self, owner_id: Uuid) -> bool {
        self.user_id == Some(owner_id)
    }
}

/// Message entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    #[sqlx(json)]
    pub metadata: MessageMetadata,
    #[sqlx(json)]
    pub edit_history: EditHistory,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a new user message
    pub fn new_user(
        conversation_id: Uuid,
        user_id: Uuid,
        content: String,
        metadata: Option<MessageMetadata>,
    ) -> Result<Self> {
        Self::validate_content(&content)?;
        let metadata = metadata.unwrap_or_default();
        metadata.validate()?;

        Ok(Self::build(
            conversation_id,
            user_id,
            MessageRole::User,
            content,
            metadata,
        ))
    }

    /// Create a new assistant message, owned by the user whose message triggered it
    pub fn new_assistant(conversation_id: Uuid, user_id: Uuid, content: String) -> Result<Self> {
        Self::validate_content(&content)?;

        Ok(Self::build(
            conversation_id,
            user_id,
            MessageRole::Assistant,
            content,
            MessageMetadata::Text,
        ))
    }

    fn build(
        conversation_id: Uuid,
        user_id: Uuid,
        role: MessageRole,
        content: String,
        metadata: MessageMetadata,
    ) -> Self {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            user_id,
            role,
            content,
            status: MessageStatus::Delivered,
            metadata,
            edit_history: EditHistory::new(),
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == MessageStatus::Deleted
    }

    /// Replace content, keeping the previous content in the edit history
    pub fn apply_edit(&mut self, new_content: String, at: DateTime<Utc>) -> Result<()> {
        Self::validate_content(&new_content)?;
        if self.is_deleted() {
            return Err(Error::Validation(
                "Cannot edit a deleted message".to_string(),
            ));
        }

        let previous = std::mem::replace(&mut self.content, new_content);
        self.edit_history.push(EditEntry {
            content: previous,
            edited_at: at,
        });
        self.edited_at = Some(at);
        Ok(())
    }

    /// Overwrite visible fields with the deleted sentinel; repeat calls keep the first `deleted_at`
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.content = DELETED_CONTENT.to_string();
        self.metadata = MessageMetadata::Deleted;
        self.status = MessageStatus::Deleted;
        if self.deleted_at.is_none() {
            self.deleted_at = Some(at);
        }
    }

    /// Validate message content (CHECK (length(trim(content)) > 0))
    fn validate_content(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::Validation(
                "Message content cannot be empty or whitespace-only".to_string(),
            ));
        }
        Ok(())
    }
}
