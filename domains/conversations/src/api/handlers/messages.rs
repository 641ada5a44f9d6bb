//! Message API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chatline_common::{OwnerId, Result, ValidatedJson};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::middleware::ConversationsState;
use crate::domain::entities::{EditHistory, Message, MessageMetadata, MessageRole, MessageStatus};

/// Request for sending a message
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    /// Message content
    pub content: String,

    /// Content kind; plain text when absent
    pub metadata: Option<MessageMetadata>,
}

/// Request for editing a message
#[derive(Debug, Deserialize, Validate)]
pub struct EditMessageRequest {
    pub content: String,
}

/// Message response DTO
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    pub metadata: MessageMetadata,
    pub edit_history: EditHistory,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            user_id: m.user_id,
            role: m.role,
            content: m.content,
            status: m.status,
            metadata: m.metadata,
            edit_history: m.edit_history,
            created_at: m.created_at,
            edited_at: m.edited_at,
            deleted_at: m.deleted_at,
        }
    }
}

/// Send a message to a conversation.
///
/// Responds once the message is stored; the assistant reply is produced in
/// the background and shows up in later listings.
pub async fn send_message(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
    Path(conversation_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let message = state
        .messages
        .append(owner_id, conversation_id, req.content, req.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(message.into())))
}

/// List messages for a conversation
pub async fn list_messages(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<MessageResponse>>> {
    let messages = state.messages.list(owner_id, conversation_id).await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Edit the content of one of the caller's messages
pub async fn edit_message(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<EditMessageRequest>,
) -> Result<Json<MessageResponse>> {
    let message = state.messages.edit(owner_id, id, req.content).await?;
    Ok(Json(message.into()))
}

/// Soft-delete one of the caller's messages
pub async fn delete_message(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    let message = state.messages.soft_delete(owner_id, id).await?;
    Ok(Json(message.into()))
}
