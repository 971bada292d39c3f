//! User model: accounts, roles, and the profile snapshot embedded elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// An Oiyn user account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v7: time-sortable)
    pub id: Uuid,

    /// Login email, stored lowercase
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub city: Option<String>,

    /// Avatar URL
    pub photo_url: Option<String>,

    /// Short "about me" text
    pub about: Option<String>,

    pub role: Role,

    /// SHA-256 hex digest of the most recently issued refresh token
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Copy the profile fields shown next to postings and messages.
    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            user_id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            photo_url: self.photo_url.clone(),
            city: self.city.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

/// Profile data copied into postings and conversations at action time.
///
/// Later profile edits do not rewrite existing snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub photo_url: Option<String>,
    pub city: Option<String>,
}

/// Signup request. The role is always `USER`; admins are promoted from the CLI.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 64, message = "First name must be 1-64 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 64, message = "Last name must be 1-64 characters"))]
    pub last_name: String,

    #[validate(length(max = 100))]
    pub city: Option<String>,

    #[validate(url(message = "Photo URL must be a valid URL"))]
    pub photo_url: Option<String>,

    #[validate(length(max = 500))]
    pub about: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Safe user representation for API responses (no sensitive fields)
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub city: Option<String>,
    pub photo_url: Option<String>,
    pub about: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            city: u.city,
            photo_url: u.photo_url,
            about: u.about,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

/// Update profile request. Absent or blank fields keep their stored value.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 64))]
    pub first_name: Option<String>,

    #[validate(length(max = 64))]
    pub last_name: Option<String>,

    #[validate(length(max = 100))]
    pub city: Option<String>,

    pub photo_url: Option<String>,

    #[validate(length(max = 500))]
    pub about: Option<String>,
}

/// Normalized sparse profile update.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub photo_url: Option<String>,
    pub about: Option<String>,
}

impl From<UpdateProfileRequest> for ProfileChanges {
    fn from(req: UpdateProfileRequest) -> Self {
        use crate::validation::non_blank;
        Self {
            first_name: non_blank(req.first_name),
            last_name: non_blank(req.last_name),
            city: non_blank(req.city),
            photo_url: non_blank(req.photo_url),
            about: non_blank(req.about),
        }
    }
}

impl ProfileChanges {
    pub fn apply(&self, user: &mut User) {
        if let Some(v) = &self.first_name {
            user.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            user.last_name = v.clone();
        }
        if let Some(v) = &self.city {
            user.city = Some(v.clone());
        }
        if let Some(v) = &self.photo_url {
            user.photo_url = Some(v.clone());
        }
        if let Some(v) = &self.about {
            user.about = Some(v.clone());
        }
    }
}
