//! Matchmaking engine: posting lifecycle and membership.
//!
//! All membership and status changes go through the store's conditional
//! updates. When one of them matches nothing, the engine re-reads the posting
//! only to pick the right error; it never writes based on that read.

use chrono::Utc;
use oiyn_common::error::{OiynError, OiynResult};
use oiyn_common::id::generate_id;
use oiyn_common::models::conversation::Conversation;
use oiyn_common::models::posting::{
    CreatePostingRequest, FilterValues, Posting, PostingChanges, PostingStatus,
    UpdatePostingRequest,
};
use oiyn_common::models::user::{Role, User};
use oiyn_common::pagination::{Page, PageRequest};
use oiyn_common::validation::validate_request;
use oiyn_db::Database;
use oiyn_db::repository::{PostingFilter, SortOrder};
use serde::Serialize;
use uuid::Uuid;

use crate::chat::ChatMaterializer;

/// Result of a successful join.
#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub posting: Posting,
    /// Present when this join took the last seat
    pub conversation: Option<Conversation>,
}

#[derive(Clone)]
pub struct MatchmakingEngine {
    db: Database,
    chats: ChatMaterializer,
}

impl MatchmakingEngine {
    pub fn new(db: Database) -> Self {
        let chats = ChatMaterializer::new(db.conversations.clone());
        Self { db, chats }
    }

    async fn user(&self, user_id: Uuid) -> OiynResult<User> {
        self.db
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| OiynError::not_found("User"))
    }

    async fn posting(&self, posting_id: Uuid) -> OiynResult<Posting> {
        self.db
            .postings
            .find_by_id(posting_id)
            .await?
            .ok_or_else(|| OiynError::not_found("Posting"))
    }

    pub async fn create_posting(
        &self,
        host_id: Uuid,
        req: CreatePostingRequest,
    ) -> OiynResult<Posting> {
        validate_request(&req)?;
        req.check()?;

        let host = self.user(host_id).await?;
        let posting = req.into_posting(generate_id(), host.snapshot(), Utc::now());
        let posting = self.db.postings.insert(posting).await?;

        tracing::info!(
            posting_id = %posting.id,
            host_id = %host_id,
            max_players = posting.max_players,
            "Posting created"
        );
        Ok(posting)
    }

    pub async fn get_posting(&self, posting_id: Uuid) -> OiynResult<Posting> {
        self.posting(posting_id).await
    }

    /// Active postings a viewer could join, excluding their own.
    pub async fn list_open(
        &self,
        viewer_id: Uuid,
        mut filter: PostingFilter,
        page: PageRequest,
    ) -> OiynResult<Page<Posting>> {
        filter.status = Some(PostingStatus::Active);
        filter.exclude_host = Some(viewer_id);
        filter.host_id = None;
        self.list(&filter, page).await
    }

    /// Postings hosted by `host_id`, optionally narrowed to one status.
    pub async fn list_hosted(
        &self,
        host_id: Uuid,
        status: Option<PostingStatus>,
        page: PageRequest,
    ) -> OiynResult<Page<Posting>> {
        let filter = PostingFilter {
            status,
            host_id: Some(host_id),
            sort: SortOrder::Desc,
            ..Default::default()
        };
        self.list(&filter, page).await
    }

    /// Every posting, for moderation.
    pub async fn list_all(
        &self,
        status: Option<PostingStatus>,
        page: PageRequest,
    ) -> OiynResult<Page<Posting>> {
        let filter = PostingFilter {
            status,
            sort: SortOrder::Desc,
            ..Default::default()
        };
        self.list(&filter, page).await
    }

    async fn list(&self, filter: &PostingFilter, page: PageRequest) -> OiynResult<Page<Posting>> {
        let (items, total) = self.db.postings.list(filter, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn filter_values(&self) -> OiynResult<FilterValues> {
        self.db.postings.filter_values().await
    }

    /// Take a seat in a posting.
    ///
    /// The joining user's profile is read fresh and appended in one conditional
    /// update. If that join took the last seat, the posting is already
    /// `inactive` and the conversation is opened before returning.
    pub async fn join_posting(&self, user_id: Uuid, posting_id: Uuid) -> OiynResult<JoinOutcome> {
        let user = self.user(user_id).await?;
        let snapshot = user.snapshot();

        let posting = match self
            .db
            .postings
            .append_player(posting_id, &snapshot, Utc::now())
            .await?
        {
            Some(posting) => posting,
            None => return Err(self.classify_join_miss(user_id, posting_id).await),
        };

        tracing::info!(
            posting_id = %posting_id,
            user_id = %user_id,
            seats_left = posting.open_seats(),
            "Player joined"
        );

        // The seat is already committed, so a failed chat insert does not fail
        // the join. A repeated join by a seated player or the next sweep opens it.
        let conversation = match self.chats.materialize_if_full(&posting).await {
            Ok(conversation) => conversation,
            Err(e) => {
                tracing::warn!(posting_id = %posting_id, "Conversation not opened: {e}");
                None
            }
        };
        Ok(JoinOutcome {
            posting,
            conversation,
        })
    }

    async fn classify_join_miss(&self, user_id: Uuid, posting_id: Uuid) -> OiynError {
        let posting = match self.db.postings.find_by_id(posting_id).await {
            Ok(Some(posting)) => posting,
            Ok(None) => return OiynError::not_found("Posting"),
            Err(e) => return e,
        };
        let rejection = posting
            .join_rejection(user_id)
            .unwrap_or(OiynError::NotAcceptingMembers);

        if matches!(rejection, OiynError::AlreadyMember) && posting.is_full() {
            if let Err(e) = self.chats.materialize_if_full(&posting).await {
                tracing::warn!(posting_id = %posting_id, "Conversation not opened: {e}");
            }
        }
        rejection
    }

    /// Host-only sparse edit. Blank and zero fields are ignored; `updated_at`
    /// always moves.
    pub async fn update_posting(
        &self,
        host_id: Uuid,
        posting_id: Uuid,
        req: UpdatePostingRequest,
    ) -> OiynResult<Posting> {
        validate_request(&req)?;
        let changes = PostingChanges::from(req);

        let current = self.posting(posting_id).await?;
        if !current.is_host(host_id) {
            tracing::warn!(posting_id = %posting_id, user_id = %host_id, "Non-host edit rejected");
            return Err(OiynError::Forbidden);
        }
        changes.check_capacity(&current)?;

        let updated = match self
            .db
            .postings
            .update_by_host(posting_id, host_id, &changes, Utc::now())
            .await?
        {
            Some(posting) => posting,
            None => {
                // Someone joined between the capacity check and the update.
                let fresh = self.posting(posting_id).await?;
                changes.check_capacity(&fresh)?;
                return Err(OiynError::validation(
                    "Posting changed during the update, try again",
                ));
            }
        };

        tracing::info!(posting_id = %posting_id, "Posting updated");
        self.reconcile(updated).await
    }

    /// Close and open the chat for a posting whose capacity edit filled it.
    async fn reconcile(&self, posting: Posting) -> OiynResult<Posting> {
        if posting.status != PostingStatus::Active || !posting.is_full() {
            return Ok(posting);
        }
        let closed = self
            .db
            .postings
            .transition(
                posting.id,
                PostingStatus::Active,
                PostingStatus::Inactive,
                Utc::now(),
            )
            .await?;
        match closed {
            Some(closed) => {
                self.chats.materialize_if_full(&closed).await?;
                Ok(closed)
            }
            None => self.posting(posting.id).await,
        }
    }

    /// Administrative status override. Any status is accepted; the caller's
    /// stored role must be `ADMIN`.
    pub async fn set_status(
        &self,
        caller_id: Uuid,
        posting_id: Uuid,
        status: PostingStatus,
    ) -> OiynResult<Posting> {
        let caller = self.user(caller_id).await?;
        if caller.role != Role::Admin {
            tracing::warn!(posting_id = %posting_id, user_id = %caller_id, "Non-admin status change rejected");
            return Err(OiynError::Forbidden);
        }

        let posting = self
            .db
            .postings
            .set_status(posting_id, status, Utc::now())
            .await?
            .ok_or_else(|| OiynError::not_found("Posting"))?;

        tracing::info!(
            posting_id = %posting_id,
            admin_id = %caller_id,
            status = status.as_str(),
            "Posting status set"
        );
        Ok(posting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRooms;
    use crate::sweeper::Sweeper;
    use crate::testing::FlakyChats;
    use chrono::Duration;
    use std::sync::Arc;

    async fn seed_user(db: &Database, name: &str, role: Role) -> User {
        let now = Utc::now();
        db.users
            .create(User {
                id: generate_id(),
                email: format!("{}@oiyn.kz", name.to_lowercase()),
                password_hash: "x".into(),
                first_name: name.into(),
                last_name: "Test".into(),
                city: Some("Almaty".into()),
                photo_url: None,
                about: None,
                role,
                refresh_token_hash: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    fn request(max_players: i32) -> CreatePostingRequest {
        CreatePostingRequest {
            title: "Mafia".into(),
            description: "Friday night".into(),
            city: "Almaty".into(),
            category: Some("party".into()),
            cover_url: None,
            max_players,
            min_players: None,
            scheduled_time: Some(Utc::now() + Duration::hours(4)),
        }
    }

    async fn setup(max_players: i32) -> (Database, MatchmakingEngine, User, Posting) {
        let db = Database::in_memory();
        let engine = MatchmakingEngine::new(db.clone());
        let host = seed_user(&db, "Host", Role::User).await;
        let posting = engine
            .create_posting(host.id, request(max_players))
            .await
            .unwrap();
        (db, engine, host, posting)
    }

    #[tokio::test]
    async fn create_snapshots_host_and_starts_active() {
        let (_, _, host, posting) = setup(4).await;
        assert_eq!(posting.status, PostingStatus::Active);
        assert!(posting.matched_players.is_empty());
        assert_eq!(posting.host.user_id, host.id);
        assert_eq!(posting.created_at, posting.updated_at);
        assert_eq!(posting.min_players, 2);
    }

    #[tokio::test]
    async fn create_rejects_non_positive_capacity() {
        let db = Database::in_memory();
        let engine = MatchmakingEngine::new(db.clone());
        let host = seed_user(&db, "Host", Role::User).await;
        for max in [0, -3, 1] {
            let err = engine.create_posting(host.id, request(max)).await.unwrap_err();
            assert!(matches!(err, OiynError::Validation { .. }));
        }
        let mut blank = request(4);
        blank.title = "   ".into();
        assert!(engine.create_posting(host.id, blank).await.is_err());
    }

    #[tokio::test]
    async fn two_seat_posting_fills_on_first_join() {
        let (db, engine, host, posting) = setup(2).await;
        let guest = seed_user(&db, "Guest", Role::User).await;

        let outcome = engine.join_posting(guest.id, posting.id).await.unwrap();
        assert_eq!(outcome.posting.status, PostingStatus::Inactive);
        let chat = outcome.conversation.unwrap();
        assert_eq!(chat.members.len(), 2);
        assert_eq!(chat.members[0].user_id, host.id);
        assert_eq!(chat.members[1].user_id, guest.id);
        assert_eq!(db.conversations.list_for_member(host.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chat_lost_on_filling_join_is_opened_later() {
        let mut db = Database::in_memory();
        db.conversations = Arc::new(FlakyChats::new(db.conversations.clone(), 2));
        let engine = MatchmakingEngine::new(db.clone());
        let host = seed_user(&db, "Host", Role::User).await;
        let retried = engine.create_posting(host.id, request(2)).await.unwrap();
        let swept = engine.create_posting(host.id, request(2)).await.unwrap();
        let guest = seed_user(&db, "Guest", Role::User).await;

        for id in [retried.id, swept.id] {
            let outcome = engine.join_posting(guest.id, id).await.unwrap();
            assert_eq!(outcome.posting.status, PostingStatus::Inactive);
            assert!(outcome.conversation.is_none());
            assert!(db.conversations.find_by_posting(id).await.unwrap().is_none());
        }

        // Retrying the join reports the membership and opens the chat
        let err = engine.join_posting(guest.id, retried.id).await.unwrap_err();
        assert!(matches!(err, OiynError::AlreadyMember));
        let chat = db.conversations.find_by_posting(retried.id).await.unwrap().unwrap();
        assert_eq!(chat.members.len(), 2);

        let sweeper = Sweeper::from_database(&db, std::time::Duration::from_secs(60));
        let report = sweeper.tick().await.unwrap();
        assert_eq!(report.chats_opened, 1);
        let chat = db.conversations.find_by_posting(swept.id).await.unwrap().unwrap();
        assert_eq!(chat.members[1].user_id, guest.id);
        assert_eq!(db.conversations.list_for_member(guest.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn joining_twice_is_rejected() {
        let (db, engine, _, posting) = setup(4).await;
        let guest = seed_user(&db, "Guest", Role::User).await;

        let first = engine.join_posting(guest.id, posting.id).await.unwrap();
        assert!(first.conversation.is_none());
        let err = engine.join_posting(guest.id, posting.id).await.unwrap_err();
        assert!(matches!(err, OiynError::AlreadyMember));
        assert_eq!(engine.get_posting(posting.id).await.unwrap().matched_players.len(), 1);
    }

    #[tokio::test]
    async fn join_rejections() {
        let (db, engine, host, posting) = setup(3).await;
        let admin = seed_user(&db, "Admin", Role::Admin).await;
        let guest = seed_user(&db, "Guest", Role::User).await;

        assert!(matches!(
            engine.join_posting(host.id, posting.id).await,
            Err(OiynError::Validation { .. })
        ));
        assert!(matches!(
            engine.join_posting(guest.id, generate_id()).await,
            Err(OiynError::NotFound { .. })
        ));

        engine
            .set_status(admin.id, posting.id, PostingStatus::Moderating)
            .await
            .unwrap();
        assert!(matches!(
            engine.join_posting(guest.id, posting.id).await,
            Err(OiynError::NotAcceptingMembers)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_never_overfill() {
        let (db, engine, host, posting) = setup(4).await;
        let mut guests = Vec::new();
        for i in 0..12 {
            guests.push(seed_user(&db, &format!("Guest{i}"), Role::User).await);
        }

        let handles: Vec<_> = guests
            .iter()
            .map(|guest| {
                let engine = engine.clone();
                let (guest_id, posting_id) = (guest.id, posting.id);
                tokio::spawn(async move { engine.join_posting(guest_id, posting_id).await })
            })
            .collect();

        let mut joined = 0;
        let mut chats = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => {
                    joined += 1;
                    if outcome.conversation.is_some() {
                        chats += 1;
                    }
                }
                Err(OiynError::NotAcceptingMembers) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(joined, 3);
        assert_eq!(chats, 1);
        let final_state = engine.get_posting(posting.id).await.unwrap();
        assert_eq!(final_state.matched_players.len(), 3);
        assert_eq!(final_state.status, PostingStatus::Inactive);
        let host_chats = db.conversations.list_for_member(host.id).await.unwrap();
        assert_eq!(host_chats.len(), 1);
        assert_eq!(host_chats[0].members.len(), 4);
    }

    #[tokio::test]
    async fn title_only_update_leaves_the_rest() {
        let (_, engine, host, posting) = setup(4).await;
        let updated = engine
            .update_posting(
                host.id,
                posting.id,
                UpdatePostingRequest {
                    title: Some("Mafia XL".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Mafia XL");
        assert_eq!(updated.description, posting.description);
        assert_eq!(updated.city, posting.city);
        assert_eq!(updated.max_players, posting.max_players);
        assert_eq!(updated.scheduled_time, posting.scheduled_time);
        assert_eq!(updated.status, posting.status);
        assert!(updated.updated_at >= posting.updated_at);
    }

    #[tokio::test]
    async fn non_host_update_is_forbidden_without_mutation() {
        let (db, engine, _, posting) = setup(4).await;
        let stranger = seed_user(&db, "Stranger", Role::User).await;
        let err = engine
            .update_posting(
                stranger.id,
                posting.id,
                UpdatePostingRequest {
                    title: Some("Hijacked".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OiynError::Forbidden));
        let stored = engine.get_posting(posting.id).await.unwrap();
        assert_eq!(stored.title, posting.title);
        assert_eq!(stored.updated_at, posting.updated_at);
    }

    #[tokio::test]
    async fn shrinking_to_current_size_closes_and_opens_chat() {
        let (db, engine, host, posting) = setup(5).await;
        let guest = seed_user(&db, "Guest", Role::User).await;
        engine.join_posting(guest.id, posting.id).await.unwrap();

        let too_small = engine
            .update_posting(
                host.id,
                posting.id,
                UpdatePostingRequest {
                    max_players: Some(1),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(too_small, Err(OiynError::Validation { .. })));

        let updated = engine
            .update_posting(
                host.id,
                posting.id,
                UpdatePostingRequest {
                    max_players: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, PostingStatus::Inactive);
        assert!(db.conversations.find_by_posting(posting.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn only_admins_set_status() {
        let (db, engine, host, posting) = setup(4).await;
        let admin = seed_user(&db, "Admin", Role::Admin).await;

        let err = engine
            .set_status(host.id, posting.id, PostingStatus::Moderating)
            .await
            .unwrap_err();
        assert!(matches!(err, OiynError::Forbidden));
        assert_eq!(
            engine.get_posting(posting.id).await.unwrap().status,
            PostingStatus::Active
        );

        let moderated = engine
            .set_status(admin.id, posting.id, PostingStatus::Moderating)
            .await
            .unwrap();
        assert_eq!(moderated.status, PostingStatus::Moderating);
        let reopened = engine
            .set_status(admin.id, posting.id, PostingStatus::Active)
            .await
            .unwrap();
        assert_eq!(reopened.status, PostingStatus::Active);
    }

    #[tokio::test]
    async fn leaving_chat_keeps_posting_membership() {
        let (db, engine, _, posting) = setup(2).await;
        let guest = seed_user(&db, "Guest", Role::User).await;
        let outcome = engine.join_posting(guest.id, posting.id).await.unwrap();
        let chat = outcome.conversation.unwrap();

        ChatRooms::new(db.clone(), 2000)
            .leave(guest.id, chat.id)
            .await
            .unwrap();

        let after = engine.get_posting(posting.id).await.unwrap();
        assert_eq!(after.matched_players.len(), 1);
        assert_eq!(after.status, PostingStatus::Inactive);
    }

    #[tokio::test]
    async fn open_listing_hides_own_and_closed_postings() {
        let (db, engine, host, posting) = setup(4).await;
        let other = seed_user(&db, "Other", Role::User).await;
        let theirs = engine.create_posting(other.id, request(2)).await.unwrap();
        let full = engine.create_posting(other.id, request(2)).await.unwrap();
        let guest = seed_user(&db, "Guest", Role::User).await;
        engine.join_posting(guest.id, full.id).await.unwrap();

        let page = engine
            .list_open(host.id, PostingFilter::default(), PageRequest::new(1, 10))
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![theirs.id]);
        assert_eq!(page.meta.total, 1);

        let hosted = engine
            .list_hosted(host.id, None, PageRequest::new(1, 10))
            .await
            .unwrap();
        assert_eq!(hosted.items[0].id, posting.id);
    }
}
