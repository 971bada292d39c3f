use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oiyn_common::error::OiynResult;
use oiyn_common::models::venue::{Venue, VenueChanges};
use oiyn_common::pagination::PageRequest;
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait VenueRepository: Send + Sync {
    async fn insert(&self, venue: Venue) -> OiynResult<Venue>;

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Venue>>;

    /// One page of venues ordered by title, plus the total count.
    async fn list(&self, page: PageRequest) -> OiynResult<(Vec<Venue>, i64)>;

    async fn update(
        &self,
        id: Uuid,
        changes: &VenueChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Venue>>;
}

pub struct PgVenues {
    pool: PgPool,
}

impl PgVenues {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VenueRepository for PgVenues {
    async fn insert(&self, venue: Venue) -> OiynResult<Venue> {
        Ok(sqlx::query_as::<_, Venue>(
            r#"
            INSERT INTO venues (id, title, rating, address, opening_time, closing_time,
                                phone_number, description, photos, latitude, longitude,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(venue.id)
        .bind(&venue.title)
        .bind(&venue.rating)
        .bind(&venue.address)
        .bind(venue.opening_time)
        .bind(venue.closing_time)
        .bind(&venue.phone_number)
        .bind(&venue.description)
        .bind(&venue.photos)
        .bind(venue.latitude)
        .bind(venue.longitude)
        .bind(venue.created_at)
        .bind(venue.updated_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<Venue>> {
        Ok(sqlx::query_as::<_, Venue>("SELECT * FROM venues WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list(&self, page: PageRequest) -> OiynResult<(Vec<Venue>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM venues")
            .fetch_one(&self.pool)
            .await?;
        let venues = sqlx::query_as::<_, Venue>(
            "SELECT * FROM venues ORDER BY title, id LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((venues, total))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &VenueChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<Venue>> {
        Ok(sqlx::query_as::<_, Venue>(
            r#"
            UPDATE venues SET
                title = COALESCE($2, title),
                rating = COALESCE($3, rating),
                address = COALESCE($4, address),
                opening_time = COALESCE($5, opening_time),
                closing_time = COALESCE($6, closing_time),
                phone_number = COALESCE($7, phone_number),
                description = COALESCE($8, description),
                photos = COALESCE($9, photos),
                latitude = COALESCE($10, latitude),
                longitude = COALESCE($11, longitude),
                updated_at = $12
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.rating)
        .bind(&changes.address)
        .bind(changes.opening_time)
        .bind(changes.closing_time)
        .bind(&changes.phone_number)
        .bind(&changes.description)
        .bind(&changes.photos)
        .bind(changes.latitude)
        .bind(changes.longitude)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }
}
