//! Conversation management API handlers

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
use crate::domain::entities::Conversation;

/// Request for creating a conversation
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreateConversationRequest {
    /// Optional conversation title; blank falls back to the default.
    /// Length is checked on the trimmed title by the domain.
    pub title: Option<String>,
}

/// Request for renaming a conversation
#[derive(Debug, Deserialize, Validate)]
pub struct RenameConversationRequest {
    #[validate(length(min = 1))]
    pub title: String,
}

/// Conversation response DTO
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationResponse {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            title: c.title,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Response for clearing every conversation of the caller
#[derive(Debug, Serialize)]
pub struct ClearConversationsResponse {
    pub deleted: u64,
}

/// Create a new conversation
pub async fn create_conversation(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
    ValidatedJson(req): ValidatedJson<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>)> {
    let created = state.conversations.create(owner_id, req.title).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// List the caller's conversations, most recently active first
pub async fn list_conversations(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
) -> Result<Json<Vec<ConversationResponse>>> {
    let convs = state.conversations.list(owner_id).await?;
    Ok(Json(convs.into_iter().map(Into::into).collect()))
}

/// Get a single conversation by ID
pub async fn get_conversation(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>> {
    let conv = state.conversations.get(owner_id, id).await?;
    Ok(Json(conv.into()))
}

/// Rename a conversation
pub async fn rename_conversation(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<RenameConversationRequest>,
) -> Result<Json<ConversationResponse>> {
    let updated = state.conversations.rename(owner_id, id, &req.title).await?;
    Ok(Json(updated.into()))
}

/// Delete a conversation with all of its messages
pub async fn delete_conversation(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.conversations.delete(owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete every conversation of the caller
pub async fn clear_conversations(
    OwnerId(owner_id): OwnerId,
    State(state): State<ConversationsState>,
) -> Result<Json<ClearConversationsResponse>> {
    let deleted = state.conversations.clear_all(owner_id).await?;
    Ok(Json(ClearConversationsResponse { deleted }))
}
