//! User repository: account storage and profile updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oiyn_common::error::OiynResult;
use oiyn_common::models::user::{ProfileChanges, Role, User};
use sqlx::PgPool;
use uuid::Uuid;

use crate::postgres::unique_violation;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new account. Fails with `AlreadyExists` on a duplicate email.
    async fn create(&self, user: User) -> OiynResult<User>;

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<User>>;

    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> OiynResult<Option<User>>;

    /// Apply a sparse profile update. `None` if the user does not exist.
    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<User>>;

    /// Record (or clear) the digest of the latest refresh token.
    async fn set_refresh_token(&self, id: Uuid, token_hash: Option<&str>) -> OiynResult<()>;

    /// Change an account's role by email. `None` if no such account.
    async fn set_role(&self, email: &str, role: Role) -> OiynResult<Option<User>>;
}

pub struct PgUsers {
    pool: PgPool,
}

impl PgUsers {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUsers {
    async fn create(&self, user: User) -> OiynResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, city, photo_url,
                               about, role, refresh_token_hash, created_at, updated_at)
            VALUES ($1, LOWER($2), $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.city)
        .bind(&user.photo_url)
        .bind(&user.about)
        .bind(user.role)
        .bind(&user.refresh_token_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Email"))
    }

    async fn find_by_id(&self, id: Uuid) -> OiynResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> OiynResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        now: DateTime<Utc>,
    ) -> OiynResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                city = COALESCE($4, city),
                photo_url = COALESCE($5, photo_url),
                about = COALESCE($6, about),
                updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.city)
        .bind(&changes.photo_url)
        .bind(&changes.about)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_refresh_token(&self, id: Uuid, token_hash: Option<&str>) -> OiynResult<()> {
        sqlx::query("UPDATE users SET refresh_token_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_role(&self, email: &str, role: Role) -> OiynResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE email = LOWER($1) RETURNING *",
        )
        .bind(email)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?)
    }
}
