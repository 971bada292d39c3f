//! Conversation model: the chat room opened once a posting fills up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::user::ProfileSnapshot;

/// A chat room tied to exactly one posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub posting_id: Uuid,
    /// Current members; leaving removes an entry here and nothing else
    pub members: Vec<ProfileSnapshot>,
    /// Append-only message log
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// Sender profile at send time
    pub sender: ProfileSnapshot,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// POST /chats/{id}/messages body.
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "Message text cannot be empty"))]
    pub text: String,
}
