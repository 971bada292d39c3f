//! Repository wrappers that inject store failures into engine tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oiyn_common::error::{OiynError, OiynResult};
use oiyn_common::models::conversation::{Conversation, Message};
use oiyn_common::models::posting::{FilterValues, Posting, PostingChanges, PostingStatus};
use oiyn_common::models::user::ProfileSnapshot;
use oiyn_common::pagination::PageRequest;
use oiyn_db::repository::{ConversationRepository, PostingFilter, PostingRepository};
use uuid::Uuid;

fn outage() -> OiynError {
    OiynError::Internal(anyhow::anyhow!("store unavailable"))
}

/// Fails the first `failures` calls to `create_for_posting`.
pub struct FlakyChats {
    inner: Arc<dyn ConversationRepository>,
    failures: AtomicUsize,
}

impl FlakyChats {
    pub fn new(inner: Arc<dyn ConversationRepository>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl ConversationRepository for FlakyChats {
    async fn create_for_posting(
        &self,
        conversation: Conversation,
    ) -> OiynResult<Option<Conversation>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(outage());
        }
        self.inner.create_for_posting(conversation).await
    }

    async fn find_by_posting(&self, posting_id: Uuid) -> OiynResult<Option<Conversation>> {
        self.inner.find_by_posting(posting_id).await
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Conversation>> {
        self.inner.find_by_id(id).await
    }

    async fn list_for_member(&self, user_id: Uuid) -> OiynResult<Vec<Conversation>> {
        self.inner.list_for_member(user_id).await
    }

    async fn remove_member(&self, id: Uuid, user_id: Uuid) -> OiynResult<Option<Conversation>> {
        self.inner.remove_member(id, user_id).await
    }

    async fn append_message(
        &self,
        id: Uuid,
        message: &Message,
    ) -> OiynResult<Option<Conversation>> {
        self.inner.append_message(id, message).await
    }
}

/// Fails `expire` once for each id in its set.
pub struct FailingExpire {
    inner: Arc<dyn PostingRepository>,
    pending: Mutex<Vec<Uuid>>,
}

impl FailingExpire {
    pub fn new(inner: Arc<dyn PostingRepository>, ids: Vec<Uuid>) -> Self {
        Self {
            inner,
            pending: Mutex::new(ids),
        }
    }
}

#[async_trait]
impl PostingRepository for FailingExpire {
    async fn insert(&self, posting: Posting) -> OiynResult<Posting> {
        self.inner.insert(posting).await
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Posting>> {
        self.inner.find_by_id(id).await
    }

    async fn list(
        &self,
        filter: &PostingFilter,
        page: PageRequest,
    ) -> OiynResult<(Vec<Posting>, i64)> {
        self.inner.list(filter, page).await
    }

    async fn filter_values(&self) -> OiynResult<FilterValues> {
        self.inner.filter_values().await
    }

    async fn append_player(
        &self,
        id: Uuid,
        player: &ProfileSnapshot,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        self.inner.append_player(id, player, now).await
    }

    async fn update_by_host(
        &self,
        id: Uuid,
        host_id: Uuid,
        changes: &PostingChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        self.inner.update_by_host(id, host_id, changes, now).await
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: PostingStatus,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        self.inner.set_status(id, status, now).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PostingStatus,
        to: PostingStatus,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        self.inner.transition(id, from, to, now).await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> OiynResult<Vec<Uuid>> {
        self.inner.find_expired(now).await
    }

    async fn expire(&self, id: Uuid, now: DateTime<Utc>) -> OiynResult<bool> {
        let fail = {
            let mut pending = self.pending.lock().unwrap();
            match pending.iter().position(|p| *p == id) {
                Some(i) => {
                    pending.remove(i);
                    true
                }
                None => false,
            }
        };
        if fail {
            return Err(outage());
        }
        self.inner.expire(id, now).await
    }

    async fn find_full_without_chat(&self, limit: i64) -> OiynResult<Vec<Posting>> {
        self.inner.find_full_without_chat(limit).await
    }
}
