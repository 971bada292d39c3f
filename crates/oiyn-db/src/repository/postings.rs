//! Posting repository: game cards and their embedded membership.
//!
//! Membership and status changes are conditional single-statement updates: the
//! `WHERE` clause carries the invariant (seat left, not yet a member, still
//! active, caller is host), and a `None` result means the condition did not hold.
//! PostgreSQL re-evaluates the condition against the latest row version when
//! two updates race on the same posting, so no read-modify-write window exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oiyn_common::error::OiynResult;
use oiyn_common::models::posting::{FilterValues, Posting, PostingChanges, PostingStatus};
use oiyn_common::models::user::ProfileSnapshot;
use oiyn_common::pagination::PageRequest;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Sort direction on `created_at`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Listing filter. Every `None` field is unconstrained.
#[derive(Debug, Default, Clone)]
pub struct PostingFilter {
    pub status: Option<PostingStatus>,
    pub host_id: Option<Uuid>,
    /// Hide postings hosted by this user (the caller's own cards)
    pub exclude_host: Option<Uuid>,
    /// Case-insensitive exact match
    pub city: Option<String>,
    pub category: Option<String>,
    pub scheduled_from: Option<DateTime<Utc>>,
    pub scheduled_to: Option<DateTime<Utc>>,
    pub sort: SortOrder,
}

impl PostingFilter {
    /// In-process evaluation of the same predicate the SQL builder emits.
    pub fn matches(&self, posting: &Posting) -> bool {
        self.status.is_none_or(|s| posting.status == s)
            && self.host_id.is_none_or(|h| posting.host_id() == h)
            && self.exclude_host.is_none_or(|h| posting.host_id() != h)
            && self
                .city
                .as_ref()
                .is_none_or(|c| posting.city.eq_ignore_ascii_case(c))
            && self
                .category
                .as_ref()
                .is_none_or(|c| posting.category.as_deref() == Some(c.as_str()))
            && self.scheduled_from.is_none_or(|t| posting.scheduled_time >= t)
            && self.scheduled_to.is_none_or(|t| posting.scheduled_time <= t)
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");
        if let Some(status) = self.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(host_id) = self.host_id {
            qb.push(" AND host_id = ").push_bind(host_id);
        }
        if let Some(host_id) = self.exclude_host {
            qb.push(" AND host_id <> ").push_bind(host_id);
        }
        if let Some(city) = &self.city {
            qb.push(" AND LOWER(city) = LOWER(").push_bind(city.clone()).push(")");
        }
        if let Some(category) = &self.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(from) = self.scheduled_from {
            qb.push(" AND scheduled_time >= ").push_bind(from);
        }
        if let Some(to) = self.scheduled_to {
            qb.push(" AND scheduled_time <= ").push_bind(to);
        }
    }
}

#[async_trait]
pub trait PostingRepository: Send + Sync {
    async fn insert(&self, posting: Posting) -> OiynResult<Posting>;

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Posting>>;

    /// One page of matching postings plus the total match count.
    async fn list(
        &self,
        filter: &PostingFilter,
        page: PageRequest,
    ) -> OiynResult<(Vec<Posting>, i64)>;

    /// Distinct cities and categories across all postings.
    async fn filter_values(&self) -> OiynResult<FilterValues>;

    /// Append `player` if the posting is active, has a free seat, is not hosted
    /// by the player, and does not already list them. Closes the posting
    /// (`inactive`) in the same update when the new player takes the last seat.
    async fn append_player(
        &self,
        id: Uuid,
        player: &ProfileSnapshot,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>>;

    /// Sparse update guarded by host identity and capacity.
    async fn update_by_host(
        &self,
        id: Uuid,
        host_id: Uuid,
        changes: &PostingChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>>;

    /// Unconditional status override.
    async fn set_status(
        &self,
        id: Uuid,
        status: PostingStatus,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>>;

    /// Move `from → to` only if the posting is still in `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: PostingStatus,
        to: PostingStatus,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>>;

    /// IDs of active postings scheduled before `now`.
    async fn find_expired(&self, now: DateTime<Utc>) -> OiynResult<Vec<Uuid>>;

    /// Close one posting if it is still active and past its schedule.
    /// Returns whether this call performed the transition.
    async fn expire(&self, id: Uuid, now: DateTime<Utc>) -> OiynResult<bool>;

    /// Full postings that have no conversation yet, oldest update first.
    async fn find_full_without_chat(&self, limit: i64) -> OiynResult<Vec<Posting>>;
}

/// Row shape of the `postings` table.
#[derive(sqlx::FromRow)]
struct PostingRow {
    id: Uuid,
    host_user: Json<ProfileSnapshot>,
    title: String,
    description: String,
    city: String,
    category: Option<String>,
    cover_url: Option<String>,
    max_players: i32,
    min_players: i32,
    scheduled_time: DateTime<Utc>,
    status: PostingStatus,
    matched_players: Json<Vec<ProfileSnapshot>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PostingRow> for Posting {
    fn from(row: PostingRow) -> Self {
        Self {
            id: row.id,
            host: row.host_user.0,
            title: row.title,
            description: row.description,
            city: row.city,
            category: row.category,
            cover_url: row.cover_url,
            max_players: row.max_players,
            min_players: row.min_players,
            scheduled_time: row.scheduled_time,
            status: row.status,
            matched_players: row.matched_players.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PgPostings {
    pool: PgPool,
}

impl PgPostings {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostingRepository for PgPostings {
    async fn insert(&self, posting: Posting) -> OiynResult<Posting> {
        let row = sqlx::query_as::<_, PostingRow>(
            r#"
            INSERT INTO postings (id, host_id, host_user, title, description, city, category,
                                  cover_url, max_players, min_players, scheduled_time, status,
                                  matched_players, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(posting.id)
        .bind(posting.host_id())
        .bind(Json(&posting.host))
        .bind(&posting.title)
        .bind(&posting.description)
        .bind(&posting.city)
        .bind(&posting.category)
        .bind(&posting.cover_url)
        .bind(posting.max_players)
        .bind(posting.min_players)
        .bind(posting.scheduled_time)
        .bind(posting.status)
        .bind(Json(&posting.matched_players))
        .bind(posting.created_at)
        .bind(posting.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Posting>> {
        let row = sqlx::query_as::<_, PostingRow>("SELECT * FROM postings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list(
        &self,
        filter: &PostingFilter,
        page: PageRequest,
    ) -> OiynResult<(Vec<Posting>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM postings");
        filter.push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM postings");
        filter.push_where(&mut select);
        select.push(match filter.sort {
            SortOrder::Asc => " ORDER BY created_at ASC, id ASC",
            SortOrder::Desc => " ORDER BY created_at DESC, id DESC",
        });
        select
            .push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<PostingRow> = select.build_query_as().fetch_all(&self.pool).await?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn filter_values(&self) -> OiynResult<FilterValues> {
        let cities: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT city FROM postings ORDER BY city")
                .fetch_all(&self.pool)
                .await?;
        let categories: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT category FROM postings WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(FilterValues { cities, categories })
    }

    async fn append_player(
        &self,
        id: Uuid,
        player: &ProfileSnapshot,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        // Column references in SET see the pre-update row: the posting is full
        // once old_len + 1 (new player) + 1 (host) reaches max_players.
        let row = sqlx::query_as::<_, PostingRow>(
            r#"
            UPDATE postings SET
                matched_players = matched_players || jsonb_build_array($2::jsonb),
                status = CASE
                    WHEN jsonb_array_length(matched_players) + 2 >= max_players THEN 'inactive'
                    ELSE status
                END,
                updated_at = $4
            WHERE id = $1
              AND status = 'active'
              AND host_id <> $3
              AND jsonb_array_length(matched_players) + 1 < max_players
              AND NOT matched_players @> jsonb_build_array(jsonb_build_object('user_id', $3::text))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Json(player))
        .bind(player.user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn update_by_host(
        &self,
        id: Uuid,
        host_id: Uuid,
        changes: &PostingChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        let row = sqlx::query_as::<_, PostingRow>(
            r#"
            UPDATE postings SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                city = COALESCE($5, city),
                category = COALESCE($6, category),
                cover_url = COALESCE($7, cover_url),
                max_players = COALESCE($8, max_players),
                min_players = COALESCE($9, min_players),
                scheduled_time = COALESCE($10, scheduled_time),
                updated_at = $11
            WHERE id = $1
              AND host_id = $2
              AND jsonb_array_length(matched_players) < COALESCE($8, max_players)
              AND COALESCE($9, min_players) <= COALESCE($8, max_players)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(host_id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.city)
        .bind(&changes.category)
        .bind(&changes.cover_url)
        .bind(changes.max_players)
        .bind(changes.min_players)
        .bind(changes.scheduled_time)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: PostingStatus,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        let row = sqlx::query_as::<_, PostingRow>(
            "UPDATE postings SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PostingStatus,
        to: PostingStatus,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Posting>> {
        let row = sqlx::query_as::<_, PostingRow>(
            r#"
            UPDATE postings SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> OiynResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM postings WHERE status = 'active' AND scheduled_time < $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn expire(&self, id: Uuid, now: DateTime<Utc>) -> OiynResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE postings SET status = 'inactive', updated_at = $2
            WHERE id = $1 AND status = 'active' AND scheduled_time < $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_full_without_chat(&self, limit: i64) -> OiynResult<Vec<Posting>> {
        let rows = sqlx::query_as::<_, PostingRow>(
            r#"
            SELECT p.* FROM postings p
            WHERE jsonb_array_length(p.matched_players) + 1 >= p.max_players
              AND NOT EXISTS (SELECT 1 FROM conversations c WHERE c.posting_id = p.id)
            ORDER BY p.updated_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
