//! Posting model: a hosted game/activity ("game card") with a fixed number of seats.
//!
//! Seats are counted including the host: a posting with `max_players = 4` has
//! room for the host plus three matched players.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::user::ProfileSnapshot;
use crate::error::OiynError;
use crate::validation::{non_blank, positive, require_text};

/// Lifecycle state of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostingStatus {
    /// Accepting members
    Active,
    /// Closed: full or past its scheduled time
    Inactive,
    /// Held by an administrator
    Moderating,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Moderating => "moderating",
        }
    }
}

impl std::str::FromStr for PostingStatus {
    type Err = OiynError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "moderating" => Ok(Self::Moderating),
            other => Err(OiynError::validation(format!("Unknown status '{other}'"))),
        }
    }
}

/// A game card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub id: Uuid,
    /// Host profile as it was when the posting was created
    pub host: ProfileSnapshot,
    pub title: String,
    pub description: String,
    pub city: String,
    pub category: Option<String>,
    pub cover_url: Option<String>,
    /// Total seats, host included
    pub max_players: i32,
    pub min_players: i32,
    pub scheduled_time: DateTime<Utc>,
    pub status: PostingStatus,
    /// Joined players in join order, host excluded
    pub matched_players: Vec<ProfileSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Posting {
    pub fn host_id(&self) -> Uuid {
        self.host.user_id
    }

    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host.user_id == user_id
    }

    pub fn has_player(&self, user_id: Uuid) -> bool {
        self.matched_players.iter().any(|p| p.user_id == user_id)
    }

    /// Seats still free for matched players.
    pub fn open_seats(&self) -> i32 {
        (self.max_players - 1 - self.matched_players.len() as i32).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.open_seats() == 0
    }

    /// Why `user_id` cannot join right now, or `None` if the join is allowed.
    pub fn join_rejection(&self, user_id: Uuid) -> Option<OiynError> {
        if self.is_host(user_id) {
            return Some(OiynError::validation("The host cannot join their own posting"));
        }
        if self.has_player(user_id) {
            return Some(OiynError::AlreadyMember);
        }
        if self.status != PostingStatus::Active || self.is_full() {
            return Some(OiynError::NotAcceptingMembers);
        }
        None
    }

    /// Everyone seated at the table: host first, then matched players.
    pub fn participants(&self) -> Vec<ProfileSnapshot> {
        std::iter::once(self.host.clone())
            .chain(self.matched_players.iter().cloned())
            .collect()
    }
}

/// POST /postings body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostingRequest {
    #[validate(length(min = 1, max = 120, message = "Title must be 1-120 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 2000, message = "Description must be 1-2000 characters"))]
    pub description: String,

    #[validate(length(min = 1, max = 100, message = "City must be 1-100 characters"))]
    pub city: String,

    #[validate(length(max = 64))]
    pub category: Option<String>,

    #[validate(url(message = "Cover URL must be a valid URL"))]
    pub cover_url: Option<String>,

    #[validate(range(min = 2, max = 100, message = "max_players must be between 2 and 100"))]
    pub max_players: i32,

    #[validate(range(min = 1, max = 100, message = "min_players must be positive"))]
    pub min_players: Option<i32>,

    #[validate(required(message = "scheduled_time is required"))]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl CreatePostingRequest {
    /// Checks the derive attributes cannot express.
    pub fn check(&self) -> Result<(), OiynError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_text("city", &self.city)?;
        match self.scheduled_time {
            Some(t) if t.timestamp() > 0 => {}
            _ => return Err(OiynError::validation("scheduled_time is required")),
        }
        if self.min_players.is_some_and(|min| min > self.max_players) {
            return Err(OiynError::validation(
                "min_players cannot exceed max_players",
            ));
        }
        Ok(())
    }

    pub fn min_players(&self) -> i32 {
        self.min_players.unwrap_or(2).min(self.max_players)
    }

    /// Build a fresh, empty, active posting hosted by `host`.
    pub fn into_posting(self, id: Uuid, host: ProfileSnapshot, now: DateTime<Utc>) -> Posting {
        let min_players = self.min_players();
        Posting {
            id,
            host,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            city: self.city.trim().to_string(),
            category: non_blank(self.category),
            cover_url: non_blank(self.cover_url),
            max_players: self.max_players,
            min_players,
            scheduled_time: self.scheduled_time.unwrap_or(now),
            status: PostingStatus::Active,
            matched_players: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// PATCH /postings/{id} body. Every field is optional.
#[derive(Debug, Default, Clone, Deserialize, Validate)]
pub struct UpdatePostingRequest {
    #[validate(length(max = 120))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 64))]
    pub category: Option<String>,
    pub cover_url: Option<String>,
    #[validate(range(max = 100))]
    pub max_players: Option<i32>,
    #[validate(range(max = 100))]
    pub min_players: Option<i32>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// Normalized sparse update: `None` means "keep the stored value".
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PostingChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub cover_url: Option<String>,
    pub max_players: Option<i32>,
    pub min_players: Option<i32>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl From<UpdatePostingRequest> for PostingChanges {
    fn from(req: UpdatePostingRequest) -> Self {
        Self {
            title: non_blank(req.title),
            description: non_blank(req.description),
            city: non_blank(req.city),
            category: non_blank(req.category),
            cover_url: non_blank(req.cover_url),
            max_players: positive(req.max_players),
            min_players: positive(req.min_players),
            scheduled_time: req.scheduled_time.filter(|t| t.timestamp() > 0),
        }
    }
}

impl PostingChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Verify the resulting capacity still seats the host and everyone who
    /// already joined.
    pub fn check_capacity(&self, posting: &Posting) -> Result<(), OiynError> {
        let max = self.max_players.unwrap_or(posting.max_players);
        let min = self.min_players.unwrap_or(posting.min_players);
        if max < 2 {
            return Err(OiynError::validation("max_players must be at least 2"));
        }
        if min > max {
            return Err(OiynError::validation(
                "min_players cannot exceed max_players",
            ));
        }
        if (posting.matched_players.len() as i32) + 1 > max {
            return Err(OiynError::validation(
                "max_players cannot drop below the players already joined",
            ));
        }
        Ok(())
    }

    pub fn apply(&self, posting: &mut Posting, now: DateTime<Utc>) {
        if let Some(v) = &self.title {
            posting.title = v.clone();
        }
        if let Some(v) = &self.description {
            posting.description = v.clone();
        }
        if let Some(v) = &self.city {
            posting.city = v.clone();
        }
        if let Some(v) = &self.category {
            posting.category = Some(v.clone());
        }
        if let Some(v) = &self.cover_url {
            posting.cover_url = Some(v.clone());
        }
        if let Some(v) = self.max_players {
            posting.max_players = v;
        }
        if let Some(v) = self.min_players {
            posting.min_players = v;
        }
        if let Some(v) = self.scheduled_time {
            posting.scheduled_time = v;
        }
        posting.updated_at = now;
    }
}

/// PUT /postings/join body.
#[derive(Debug, Deserialize)]
pub struct JoinPostingRequest {
    pub posting_id: Uuid,
}

/// POST /admin/postings/{id} body.
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: PostingStatus,
}

/// Distinct filter values offered to clients.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FilterValues {
    pub cities: Vec<String>,
    pub categories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(name: &str) -> ProfileSnapshot {
        ProfileSnapshot {
            user_id: Uuid::now_v7(),
            first_name: name.into(),
            last_name: "Test".into(),
            photo_url: None,
            city: Some("Almaty".into()),
        }
    }

    fn posting(max_players: i32) -> Posting {
        let now = Utc::now();
        CreatePostingRequest {
            title: "Mafia".into(),
            description: "Evening game".into(),
            city: "Almaty".into(),
            category: Some("party".into()),
            cover_url: None,
            max_players,
            min_players: None,
            scheduled_time: Some(now + Duration::hours(2)),
        }
        .into_posting(Uuid::now_v7(), snapshot("Host"), now)
    }

    #[test]
    fn host_counts_as_a_seat() {
        let mut p = posting(2);
        assert_eq!(p.open_seats(), 1);
        p.matched_players.push(snapshot("Aru"));
        assert!(p.is_full());
        assert_eq!(p.participants().len(), 2);
    }

    #[test]
    fn join_rejections_are_classified() {
        let mut p = posting(3);
        let host = p.host_id();
        assert!(matches!(
            p.join_rejection(host),
            Some(OiynError::Validation { .. })
        ));

        let player = snapshot("Dana");
        let player_id = player.user_id;
        p.matched_players.push(player);
        assert!(matches!(
            p.join_rejection(player_id),
            Some(OiynError::AlreadyMember)
        ));

        let newcomer = Uuid::now_v7();
        assert!(p.join_rejection(newcomer).is_none());
        p.status = PostingStatus::Moderating;
        assert!(matches!(
            p.join_rejection(newcomer),
            Some(OiynError::NotAcceptingMembers)
        ));
    }

    #[test]
    fn create_requires_a_schedule() {
        let req = CreatePostingRequest {
            title: "Chess".into(),
            description: "Blitz".into(),
            city: "Astana".into(),
            category: None,
            cover_url: None,
            max_players: 2,
            min_players: None,
            scheduled_time: None,
        };
        assert!(req.check().is_err());
    }

    #[test]
    fn zero_valued_fields_do_not_overwrite() {
        let changes = PostingChanges::from(UpdatePostingRequest {
            title: Some("New title".into()),
            description: Some("".into()),
            max_players: Some(0),
            ..Default::default()
        });
        assert_eq!(changes.title.as_deref(), Some("New title"));
        assert_eq!(changes.description, None);
        assert_eq!(changes.max_players, None);

        let mut p = posting(4);
        let before = p.clone();
        changes.apply(&mut p, Utc::now());
        assert_eq!(p.title, "New title");
        assert_eq!(p.description, before.description);
        assert_eq!(p.max_players, before.max_players);
        assert_eq!(p.created_at, before.created_at);
    }

    #[test]
    fn capacity_cannot_shrink_below_joined_players() {
        let mut p = posting(4);
        p.matched_players.push(snapshot("A"));
        p.matched_players.push(snapshot("B"));
        let shrink = PostingChanges {
            max_players: Some(2),
            ..Default::default()
        };
        assert!(shrink.check_capacity(&p).is_err());
        let exact = PostingChanges {
            max_players: Some(3),
            ..Default::default()
        };
        assert!(exact.check_capacity(&p).is_ok());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            PostingStatus::Active,
            PostingStatus::Inactive,
            PostingStatus::Moderating,
        ] {
            assert_eq!(status.as_str().parse::<PostingStatus>().unwrap(), status);
        }
        assert!("closed".parse::<PostingStatus>().is_err());
    }
}
