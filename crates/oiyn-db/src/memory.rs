//! In-memory store for lite mode and tests.
//!
//! Each collection sits behind its own `RwLock`. Conditional mutations check
//! and apply under a single write guard, which gives them the same
//! all-or-nothing behavior as the conditional `UPDATE`s in the PostgreSQL
//! repositories.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oiyn_common::error::{OiynError, OiynResult};
use oiyn_common::models::conversation::{Conversation, Message};
use oiyn_common::models::posting::{FilterValues, Posting, PostingChanges, PostingStatus};
use oiyn_common::models::user::{ProfileChanges, ProfileSnapshot, Role, User};
use oiyn_common::models::venue::{Venue, VenueChanges};
use oiyn_common::pagination::PageRequest;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{
    ConversationRepository, PostingFilter, PostingRepository, SortOrder, UserRepository,
    VenueRepository,
};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    postings: RwLock<HashMap<Uuid, Posting>>,
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    venues: RwLock<HashMap<Uuid, Venue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page_of<T>(items: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let window = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    (window, total)
}

// ============================================================
// Users
// ============================================================

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, mut user: User) -> OiynResult<User> {
        user.email = user.email.to_lowercase();
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(OiynError::AlreadyExists {
                resource: "Email".into(),
            });
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> OiynResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            changes.apply(user);
            user.updated_at = now;
            user.clone()
        }))
    }

    async fn set_refresh_token(&self, id: Uuid, token_hash: Option<&str>) -> OiynResult<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.refresh_token_hash = token_hash.map(str::to_string);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_role(&self, email: &str, role: Role) -> OiynResult<Option<User>> {
        let email = email.to_lowercase();
        let mut users = self.users.write().await;
        Ok(users.values_mut().find(|u| u.email == email).map(|user| {
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

// ============================================================
// Postings
// ============================================================

#[async_trait]
impl PostingRepository for MemoryStore {
    async fn insert(&self, posting: Posting) -> OiynResult<Posting> {
        let mut postings = self.postings.write().await;
        if postings.contains_key(&posting.id) {
            return Err(OiynError::AlreadyExists {
                resource: "Posting".into(),
            });
        }
        postings.insert(posting.id, posting.clone());
        Ok(posting)
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Posting>> {
        Ok(self.postings.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &PostingFilter,
        page: PageRequest,
    ) -> OiynResult<(Vec<Posting>, i64)> {
        let mut matching: Vec<Posting> = self
            .postings
            .read()
            .await
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by_key(|p| (p.created_at, p.id));
        if filter.sort == SortOrder::Desc {
            matching.reverse();
        }
        Ok(page_of(matching, page))
    }

    async fn filter_values(&self) -> OiynResult<FilterValues> {
        let postings = self.postings.read().await;
        let cities: BTreeSet<String> = postings.values().map(|p| p.city.clone()).collect();
        let categories: BTreeSet<String> =
            postings.values().filter_map(|p| p.category.clone()).collect();
        Ok(FilterValues {
            cities: cities.into_iter().collect(),
            categories: categories.into_iter().collect(),
        })
    }

    async fn append_player(
        &self,
        id: Uuid,
        player: &ProfileSnapshot,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        let mut postings = self.postings.write().await;
        let Some(posting) = postings.get_mut(&id) else {
            return Ok(None);
        };
        if posting.join_rejection(player.user_id).is_some() {
            return Ok(None);
        }
        posting.matched_players.push(player.clone());
        if posting.is_full() {
            posting.status = PostingStatus::Inactive;
        }
        posting.updated_at = now;
        Ok(Some(posting.clone()))
    }

    async fn update_by_host(
        &self,
        id: Uuid,
        host_id: Uuid,
        changes: &PostingChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        let mut postings = self.postings.write().await;
        let Some(posting) = postings.get_mut(&id) else {
            return Ok(None);
        };
        if !posting.is_host(host_id) || changes.check_capacity(posting).is_err() {
            return Ok(None);
        }
        changes.apply(posting, now);
        Ok(Some(posting.clone()))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: PostingStatus,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        let mut postings = self.postings.write().await;
        Ok(postings.get_mut(&id).map(|posting| {
            posting.status = status;
            posting.updated_at = now;
            posting.clone()
        }))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PostingStatus,
        to: PostingStatus,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        let mut postings = self.postings.write().await;
        Ok(postings
            .get_mut(&id)
            .filter(|p| p.status == from)
            .map(|posting| {
                posting.status = to;
                posting.updated_at = now;
                posting.clone()
            }))
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> OiynResult<Vec<Uuid>> {
        Ok(self
            .postings
            .read()
            .await
            .values()
            .filter(|p| p.status == PostingStatus::Active && p.scheduled_time < now)
            .map(|p| p.id)
            .collect())
    }

    async fn expire(&self, id: Uuid, now: DateTime<Utc>) -> OiynResult<bool> {
        let mut postings = self.postings.write().await;
        match postings.get_mut(&id) {
            Some(p) if p.status == PostingStatus::Active && p.scheduled_time < now => {
                p.status = PostingStatus::Inactive;
                p.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_full_without_chat(&self, limit: i64) -> OiynResult<Vec<Posting>> {
        let postings = self.postings.read().await;
        let conversations = self.conversations.read().await;
        let mut missing: Vec<Posting> = postings
            .values()
            .filter(|p| p.is_full())
            .filter(|p| !conversations.values().any(|c| c.posting_id == p.id))
            .cloned()
            .collect();
        missing.sort_by_key(|p| (p.updated_at, p.id));
        missing.truncate(limit.max(0) as usize);
        Ok(missing)
    }
}

// ============================================================
// Conversations
// ============================================================

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn create_for_posting(
        &self,
        conversation: Conversation,
    ) -> OiynResult<Option<Conversation>> {
        let mut conversations = self.conversations.write().await;
        if conversations
            .values()
            .any(|c| c.posting_id == conversation.posting_id)
        {
            return Ok(None);
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(Some(conversation))
    }

    async fn find_by_posting(&self, posting_id: Uuid) -> OiynResult<Option<Conversation>> {
        Ok(self
            .conversations
            .read()
            .await
            .values()
            .find(|c| c.posting_id == posting_id)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn list_for_member(&self, user_id: Uuid) -> OiynResult<Vec<Conversation>> {
        let mut chats: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.is_member(user_id))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats)
    }

    async fn remove_member(&self, id: Uuid, user_id: Uuid) -> OiynResult<Option<Conversation>> {
        let mut conversations = self.conversations.write().await;
        Ok(conversations
            .get_mut(&id)
            .filter(|c| c.is_member(user_id))
            .map(|chat| {
                chat.members.retain(|m| m.user_id != user_id);
                chat.clone()
            }))
    }

    async fn append_message(
        &self,
        id: Uuid,
        message: &Message,
    ) -> OiynResult<Option<Conversation>> {
        let mut conversations = self.conversations.write().await;
        Ok(conversations
            .get_mut(&id)
            .filter(|c| c.is_member(message.sender.user_id))
            .map(|chat| {
                chat.messages.push(message.clone());
                chat.clone()
            }))
    }
}

// ============================================================
// Venues
// ============================================================

#[async_trait]
impl VenueRepository for MemoryStore {
    async fn insert(&self, venue: Venue) -> OiynResult<Venue> {
        self.venues.write().await.insert(venue.id, venue.clone());
        Ok(venue)
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Venue>> {
        Ok(self.venues.read().await.get(&id).cloned())
    }

    async fn list(&self, page: PageRequest) -> OiynResult<(Vec<Venue>, i64)> {
        let mut venues: Vec<Venue> = self.venues.read().await.values().cloned().collect();
        venues.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(page_of(venues, page))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &VenueChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Venue>> {
        let mut venues = self.venues.write().await;
        Ok(venues.get_mut(&id).map(|venue| {
            changes.apply(venue, now);
            venue.clone()
        }))
    }
}
