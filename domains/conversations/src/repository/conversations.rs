//! Conversation repository (PostgreSQL)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::Conversation;
use crate::repository::ConversationStore;
use chatline_common::Result;

#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn create(&self, conv: &Conversation) -> Result<Conversation> {
        let created = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, user_id, title, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, title, created_at, updated_at
            "#,
        )
        .bind(conv.id)
        .bind(conv.user_id)
        .bind(&conv.title)
        .bind(conv.created_at)
        .bind(conv.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Conversation>> {
        let conv = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, created_at, updated_at
            FROM conversations
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conv)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Conversation>> {
        let convs = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, created_at, updated_at
            FROM conversations
            WHERE user_id = $1
            ORDER BY updated_at DESC, created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(convs)
    }

    async fn update_title(
        &self,
        id: Uuid,
        owner_id: Uuid,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        let updated = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations SET
                title = $3,
                updated_at = GREATEST(updated_at, $4)
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(title)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE conversations SET updated_at = GREATEST(updated_at, $2) WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_owned(&self, id: Uuid, owner_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversations WHERE user_id = $1")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
