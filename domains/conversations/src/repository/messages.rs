//! Message repository (PostgreSQL)
//!
//! `metadata` and `edit_history` are JSONB columns. Rows carry an identity
//! `seq` column that breaks creation-time ties in insertion order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{Message, MessageMetadata, MessageStatus, DELETED_CONTENT};
use crate::repository::MessageStore;
use chatline_common::Result;

const MESSAGE_COLUMNS: &str = "id, conversation_id, user_id, role, content, status, \
     metadata, edit_history, created_at, edited_at, deleted_at";

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(&self, msg: &Message) -> Result<Message> {
        let sql = format!(
            r#"
            INSERT INTO messages (
                id, conversation_id, user_id, role, content, status,
                metadata, edit_history, created_at, edited_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );

        let created = sqlx::query_as::<_, Message>(&sql)
            .bind(msg.id)
            .bind(msg.conversation_id)
            .bind(msg.user_id)
            .bind(msg.role)
            .bind(&msg.content)
            .bind(msg.status)
            .bind(Json(&msg.metadata))
            .bind(Json(&msg.edit_history))
            .bind(msg.created_at)
            .bind(msg.edited_at)
            .bind(msg.deleted_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND user_id = $2");

        let msg = sqlx::query_as::<_, Message>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(msg)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 ORDER BY created_at ASC, seq ASC"
        );

        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(messages)
    }

    async fn save_edit(&self, edited: &Message, previous: &Message) -> Result<Option<Message>> {
        let sql = format!(
            r#"
            UPDATE messages SET
                content = $3,
                edit_history = $4,
                edited_at = $5
            WHERE id = $1 AND user_id = $2 AND status <> $6
              AND content = $7 AND edited_at IS NOT DISTINCT FROM $8
            RETURNING {MESSAGE_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, Message>(&sql)
            .bind(edited.id)
            .bind(edited.user_id)
            .bind(&edited.content)
            .bind(Json(&edited.edit_history))
            .bind(edited.edited_at)
            .bind(MessageStatus::Deleted)
            .bind(&previous.content)
            .bind(previous.edited_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(updated)
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>> {
        let sql = format!(
            r#"
            UPDATE messages SET
                content = $3,
                metadata = $4,
                status = $5,
                deleted_at = COALESCE(deleted_at, $6)
            WHERE id = $1 AND user_id = $2
            RETURNING {MESSAGE_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, Message>(&sql)
            .bind(id)
            .bind(owner_id)
            .bind(DELETED_CONTENT)
            .bind(Json(MessageMetadata::Deleted))
            .bind(MessageStatus::Deleted)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(updated)
    }

    async fn delete_by_conversation(&self, conversation_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_by_conversations(&self, conversation_ids: &[Uuid]) -> Result<u64> {
        if conversation_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = ANY($1)")
            .bind(conversation_ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
