//! Conversation repository.
//!
//! A conversation row is unique per posting; creation uses
//! `ON CONFLICT DO NOTHING` so materializing twice is harmless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oiyn_common::error::OiynResult;
use oiyn_common::models::conversation::{Conversation, Message};
use oiyn_common::models::user::ProfileSnapshot;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert the conversation unless one already exists for its posting.
    /// Returns `None` when another caller created it first.
    async fn create_for_posting(&self, conversation: Conversation)
    -> OiynResult<Option<Conversation>>;

    async fn find_by_posting(&self, posting_id: Uuid) -> OiynResult<Option<Conversation>>;

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Conversation>>;

    /// Conversations listing `user_id` among their members, newest first.
    async fn list_for_member(&self, user_id: Uuid) -> OiynResult<Vec<Conversation>>;

    /// Drop `user_id` from the member list. `None` if the conversation does
    /// not exist or the user is not a member.
    async fn remove_member(&self, id: Uuid, user_id: Uuid) -> OiynResult<Option<Conversation>>;

    /// Append a message if its sender is a current member. `None` otherwise.
    async fn append_message(&self, id: Uuid, message: &Message)
    -> OiynResult<Option<Conversation>>;
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    posting_id: Uuid,
    title: String,
    members: Json<Vec<ProfileSnapshot>>,
    messages: Json<Vec<Message>>,
    created_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            posting_id: row.posting_id,
            members: row.members.0,
            messages: row.messages.0,
            created_at: row.created_at,
        }
    }
}

pub struct PgConversations {
    pool: PgPool,
}

impl PgConversations {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversations {
    async fn create_for_posting(
        &self,
        conversation: Conversation,
    ) -> OiynResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            INSERT INTO conversations (id, posting_id, title, members, messages, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (posting_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.posting_id)
        .bind(&conversation.title)
        .bind(Json(&conversation.members))
        .bind(Json(&conversation.messages))
        .bind(conversation.created_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_posting(&self, posting_id: Uuid) -> OiynResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE posting_id = $1",
        )
        .bind(posting_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_for_member(&self, user_id: Uuid) -> OiynResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT * FROM conversations
            WHERE members @> jsonb_build_array(jsonb_build_object('user_id', $1::text))
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn remove_member(&self, id: Uuid, user_id: Uuid) -> OiynResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            UPDATE conversations SET members = COALESCE(
                (SELECT jsonb_agg(m) FROM jsonb_array_elements(members) AS m
                 WHERE m->>'user_id' <> $2::text),
                '[]'::jsonb
            )
            WHERE id = $1
              AND members @> jsonb_build_array(jsonb_build_object('user_id', $2::text))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn append_message(
        &self,
        id: Uuid,
        message: &Message,
    ) -> OiynResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            UPDATE conversations SET messages = messages || jsonb_build_array($2::jsonb)
            WHERE id = $1
              AND members @> jsonb_build_array(jsonb_build_object('user_id', $3::text))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Json(message))
        .bind(message.sender.user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}
