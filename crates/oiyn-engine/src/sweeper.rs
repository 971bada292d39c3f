//! Expiry sweeper.
//!
//! Periodically closes active postings whose scheduled time has passed. Each
//! posting is closed with its own conditional update, so a failure on one is
//! logged and retried on the next tick without affecting the others.
//!
//! Each tick also opens the conversation of any full posting that lacks one,
//! which happens when a join took the last seat but its chat insert failed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use oiyn_common::error::OiynResult;
use oiyn_db::Database;
use oiyn_db::repository::PostingRepository;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::chat::ChatMaterializer;

/// Full postings repaired per tick.
const REPAIR_BATCH: i64 = 100;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidates found past their scheduled time
    pub scanned: usize,
    /// Postings this tick moved to `inactive`
    pub expired: usize,
    /// Postings whose update failed
    pub failed: usize,
    /// Conversations opened for full postings that had none
    pub chats_opened: usize,
}

pub struct Sweeper {
    postings: Arc<dyn PostingRepository>,
    chats: ChatMaterializer,
    every: Duration,
}

impl Sweeper {
    pub fn new(
        postings: Arc<dyn PostingRepository>,
        chats: ChatMaterializer,
        every: Duration,
    ) -> Self {
        Self {
            postings,
            chats,
            every,
        }
    }

    pub fn from_database(db: &Database, every: Duration) -> Self {
        Self::new(
            db.postings.clone(),
            ChatMaterializer::new(db.conversations.clone()),
            every,
        )
    }

    pub async fn tick(&self) -> OiynResult<SweepReport> {
        self.tick_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> OiynResult<SweepReport> {
        let candidates = self.postings.find_expired(now).await?;
        let mut report = SweepReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        for id in candidates {
            match self.postings.expire(id, now).await {
                Ok(true) => {
                    report.expired += 1;
                    tracing::debug!(posting_id = %id, "Posting expired");
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(posting_id = %id, "Failed to expire posting: {e}");
                }
            }
        }

        self.open_missing_chats(&mut report).await;

        if report.expired > 0 || report.failed > 0 || report.chats_opened > 0 {
            tracing::info!(
                expired = report.expired,
                failed = report.failed,
                chats_opened = report.chats_opened,
                "Sweep finished"
            );
        }
        Ok(report)
    }

    async fn open_missing_chats(&self, report: &mut SweepReport) {
        let full = match self.postings.find_full_without_chat(REPAIR_BATCH).await {
            Ok(full) => full,
            Err(e) => {
                tracing::warn!("Failed to look up full postings without a chat: {e}");
                return;
            }
        };

        for posting in full {
            match self.chats.materialize_if_full(&posting).await {
                Ok(Some(_)) => report.chats_opened += 1,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(posting_id = %posting.id, "Failed to open conversation: {e}");
                }
            }
        }
    }

    /// Tick on a fixed interval until `shutdown` flips to `true` or its sender
    /// is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.every.as_secs(), "Sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("Sweep failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Sweeper stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingExpire;
    use chrono::Duration as ChronoDuration;
    use oiyn_common::id::generate_id;
    use oiyn_common::models::posting::{Posting, PostingStatus};
    use oiyn_common::models::user::ProfileSnapshot;
    use oiyn_db::Database;

    fn posting(scheduled_in: ChronoDuration) -> Posting {
        let now = Utc::now();
        Posting {
            id: generate_id(),
            host: ProfileSnapshot {
                user_id: generate_id(),
                first_name: "Host".into(),
                last_name: "T".into(),
                photo_url: None,
                city: None,
            },
            title: "Poker".into(),
            description: "Low stakes".into(),
            city: "Shymkent".into(),
            category: None,
            cover_url: None,
            max_players: 6,
            min_players: 2,
            scheduled_time: now + scheduled_in,
            status: PostingStatus::Active,
            matched_players: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn expires_each_posting_exactly_once() {
        let db = Database::in_memory();
        let past = db.postings.insert(posting(ChronoDuration::minutes(-5))).await.unwrap();
        let future = db.postings.insert(posting(ChronoDuration::hours(2))).await.unwrap();
        let sweeper = Sweeper::from_database(&db, Duration::from_secs(60));

        let now = Utc::now();
        let first = sweeper.tick_at(now).await.unwrap();
        assert_eq!(first.expired, 1);
        let second = sweeper.tick_at(now).await.unwrap();
        assert_eq!(second, SweepReport::default());

        let stored = db.postings.find_by_id(past.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostingStatus::Inactive);
        let untouched = db.postings.find_by_id(future.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, PostingStatus::Active);
    }

    #[tokio::test]
    async fn moderated_postings_are_left_alone() {
        let db = Database::in_memory();
        let held = db.postings.insert(posting(ChronoDuration::minutes(-5))).await.unwrap();
        db.postings
            .set_status(held.id, PostingStatus::Moderating, Utc::now())
            .await
            .unwrap();
        let sweeper = Sweeper::from_database(&db, Duration::from_secs(60));

        assert_eq!(sweeper.tick().await.unwrap().scanned, 0);
        let stored = db.postings.find_by_id(held.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostingStatus::Moderating);
    }

    #[tokio::test]
    async fn failed_expiry_is_skipped_and_retried() {
        let db = Database::in_memory();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let p = db.postings.insert(posting(ChronoDuration::minutes(-5))).await.unwrap();
            ids.push(p.id);
        }
        let broken = ids[1];
        let postings: Arc<dyn PostingRepository> =
            Arc::new(FailingExpire::new(db.postings.clone(), vec![broken]));
        let sweeper = Sweeper::new(
            postings,
            ChatMaterializer::new(db.conversations.clone()),
            Duration::from_secs(60),
        );

        let now = Utc::now();
        let first = sweeper.tick_at(now).await.unwrap();
        assert_eq!(first.scanned, 3);
        assert_eq!(first.expired, 2);
        assert_eq!(first.failed, 1);
        for id in &ids {
            let stored = db.postings.find_by_id(*id).await.unwrap().unwrap();
            let expected = if *id == broken {
                PostingStatus::Active
            } else {
                PostingStatus::Inactive
            };
            assert_eq!(stored.status, expected);
        }

        let second = sweeper.tick_at(now).await.unwrap();
        assert_eq!(second.scanned, 1);
        assert_eq!(second.expired, 1);
        assert_eq!(second.failed, 0);
        let stored = db.postings.find_by_id(broken).await.unwrap().unwrap();
        assert_eq!(stored.status, PostingStatus::Inactive);
    }

    #[tokio::test]
    async fn opens_missing_chat_for_full_posting() {
        let db = Database::in_memory();
        let mut p = posting(ChronoDuration::hours(2));
        p.max_players = 2;
        let p = db.postings.insert(p).await.unwrap();
        let guest = ProfileSnapshot {
            user_id: generate_id(),
            first_name: "Guest".into(),
            last_name: "T".into(),
            photo_url: None,
            city: None,
        };
        // Seat taken without going through the engine, so no chat exists yet
        let full = db
            .postings
            .append_player(p.id, &guest, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(full.status, PostingStatus::Inactive);

        let sweeper = Sweeper::from_database(&db, Duration::from_secs(60));
        let report = sweeper.tick().await.unwrap();
        assert_eq!(report.chats_opened, 1);
        let chat = db.conversations.find_by_posting(p.id).await.unwrap().unwrap();
        assert_eq!(chat.members.len(), 2);
        assert_eq!(chat.members[1].user_id, guest.user_id);

        assert_eq!(sweeper.tick().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let db = Database::in_memory();
        let sweeper = Sweeper::from_database(&db, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);
        let handle = sweeper.spawn(rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
