//! Conversations: created once per full posting, then owned by their members.

use std::sync::Arc;

use chrono::Utc;
use oiyn_common::error::{OiynError, OiynResult};
use oiyn_common::id::generate_id;
use oiyn_common::models::conversation::{Conversation, Message};
use oiyn_common::models::posting::Posting;
use oiyn_db::Database;
use oiyn_db::repository::ConversationRepository;
use uuid::Uuid;

/// Opens the chat for a posting once every seat is taken.
#[derive(Clone)]
pub struct ChatMaterializer {
    conversations: Arc<dyn ConversationRepository>,
}

impl ChatMaterializer {
    pub fn new(conversations: Arc<dyn ConversationRepository>) -> Self {
        Self { conversations }
    }

    /// Create the posting's conversation if the posting is full.
    ///
    /// Returns `None` while seats remain. If the conversation already exists
    /// it is returned unchanged; nothing is created twice.
    pub async fn materialize_if_full(&self, posting: &Posting) -> OiynResult<Option<Conversation>> {
        if !posting.is_full() {
            return Ok(None);
        }

        let conversation = Conversation {
            id: generate_id(),
            title: posting.title.clone(),
            posting_id: posting.id,
            members: posting.participants(),
            messages: Vec::new(),
            created_at: Utc::now(),
        };

        match self.conversations.create_for_posting(conversation).await? {
            Some(created) => {
                tracing::info!(
                    posting_id = %posting.id,
                    conversation_id = %created.id,
                    members = created.members.len(),
                    "Conversation opened"
                );
                Ok(Some(created))
            }
            None => self.conversations.find_by_posting(posting.id).await,
        }
    }
}

/// Member-facing chat operations.
#[derive(Clone)]
pub struct ChatRooms {
    db: Database,
    max_message_length: usize,
}

impl ChatRooms {
    pub fn new(db: Database, max_message_length: usize) -> Self {
        Self {
            db,
            max_message_length,
        }
    }

    pub async fn list_for_member(&self, user_id: Uuid) -> OiynResult<Vec<Conversation>> {
        self.db.conversations.list_for_member(user_id).await
    }

    pub async fn get_for_member(&self, user_id: Uuid, chat_id: Uuid) -> OiynResult<Conversation> {
        let chat = self
            .db
            .conversations
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| OiynError::not_found("Conversation"))?;
        if !chat.is_member(user_id) {
            return Err(OiynError::Forbidden);
        }
        Ok(chat)
    }

    /// Remove the caller from the member list. The posting is not touched.
    pub async fn leave(&self, user_id: Uuid, chat_id: Uuid) -> OiynResult<Conversation> {
        match self.db.conversations.remove_member(chat_id, user_id).await? {
            Some(chat) => {
                tracing::info!(conversation_id = %chat_id, user_id = %user_id, "Left conversation");
                Ok(chat)
            }
            None => Err(self.classify_miss(chat_id).await),
        }
    }

    /// Append a message from a current member, with the sender's profile as it
    /// is right now.
    pub async fn send_message(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        text: &str,
    ) -> OiynResult<Message> {
        let content = text.trim();
        if content.is_empty() {
            return Err(OiynError::validation("Message text cannot be empty"));
        }
        if content.chars().count() > self.max_message_length {
            return Err(OiynError::validation(format!(
                "Message text cannot exceed {} characters",
                self.max_message_length
            )));
        }

        let sender = self
            .db
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| OiynError::not_found("User"))?;

        let message = Message {
            id: generate_id(),
            sender: sender.snapshot(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        match self.db.conversations.append_message(chat_id, &message).await? {
            Some(_) => Ok(message),
            None => Err(self.classify_miss(chat_id).await),
        }
    }

    /// A conditional chat update matched nothing: either the chat is gone or
    /// the caller is not a member of it.
    async fn classify_miss(&self, chat_id: Uuid) -> OiynError {
        match self.db.conversations.find_by_id(chat_id).await {
            Ok(Some(_)) => OiynError::Forbidden,
            Ok(None) => OiynError::not_found("Conversation"),
            Err(e) => e,
        }
    }
}
