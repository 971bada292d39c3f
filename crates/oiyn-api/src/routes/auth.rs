//! Authentication routes: signup, login, refresh.

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use chrono::Utc;
use oiyn_common::{
    auth::REFRESH_TOKEN,
    error::{OiynError, OiynResult},
    id::generate_id,
    models::user::{LoginRequest, Role, SignupRequest, User, UserResponse},
    validation::{non_blank, validate_request},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    AppState,
    auth::{self, TokenPair},
};

/// Auth router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
}

#[derive(Serialize)]
struct AuthResponse {
    user: UserResponse,
    #[serde(flatten)]
    tokens: TokenPair,
}

#[derive(Deserialize, Validate)]
struct RefreshRequest {
    #[validate(length(min = 1, message = "refresh_token is required"))]
    refresh_token: String,
}

/// Issue a fresh token pair and record the refresh token's digest.
async fn issue_tokens(state: &AppState, user: &User) -> OiynResult<TokenPair> {
    let tokens =
        auth::generate_token_pair(user, &state.auth).map_err(|e| OiynError::Internal(e.into()))?;
    state
        .db
        .users
        .set_refresh_token(user.id, Some(&auth::token_digest(&tokens.refresh_token)))
        .await?;
    Ok(tokens)
}

/// POST /api/auth/signup
///
/// Create a new account with the `USER` role. Returns profile + tokens.
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupRequest>,
) -> OiynResult<(StatusCode, Json<AuthResponse>)> {
    validate_request(&body)?;

    if state.db.users.find_by_email(&body.email).await?.is_some() {
        return Err(OiynError::AlreadyExists {
            resource: "Email".into(),
        });
    }

    let password_hash = auth::hash_password(&body.password)
        .map_err(|e| OiynError::Internal(anyhow::anyhow!("{e}")))?;

    let now = Utc::now();
    let user = state
        .db
        .users
        .create(User {
            id: generate_id(),
            email: body.email.trim().to_lowercase(),
            password_hash,
            first_name: body.first_name.trim().to_string(),
            last_name: body.last_name.trim().to_string(),
            city: non_blank(body.city),
            photo_url: non_blank(body.photo_url),
            about: non_blank(body.about),
            role: Role::User,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let tokens = issue_tokens(&state, &user).await?;

    tracing::info!(user_id = %user.id, "New user signed up");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            tokens,
        }),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> OiynResult<Json<AuthResponse>> {
    validate_request(&body)?;

    let user = state
        .db
        .users
        .find_by_email(body.email.trim())
        .await?
        .ok_or(OiynError::InvalidCredentials)?;

    let valid = auth::verify_password(&body.password, &user.password_hash)
        .map_err(|_| OiynError::InvalidCredentials)?;
    if !valid {
        return Err(OiynError::InvalidCredentials);
    }

    let tokens = issue_tokens(&state, &user).await?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        user: user.into(),
        tokens,
    }))
}

/// POST /api/auth/refresh
///
/// Exchange the latest refresh token for a new pair. Older refresh tokens stop
/// working once a newer one has been issued.
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> OiynResult<Json<TokenPair>> {
    validate_request(&body)?;

    let claims = auth::validate_token(&body.refresh_token, &state.auth.jwt_secret)
        .map_err(|_| OiynError::InvalidToken)?;
    if claims.token_type != REFRESH_TOKEN {
        return Err(OiynError::InvalidToken);
    }

    let user_id: uuid::Uuid = claims.sub.parse().map_err(|_| OiynError::InvalidToken)?;
    let user = state
        .db
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(OiynError::InvalidToken)?;

    if user.refresh_token_hash.as_deref() != Some(auth::token_digest(&body.refresh_token).as_str()) {
        tracing::warn!(user_id = %user.id, "Stale refresh token presented");
        return Err(OiynError::InvalidToken);
    }

    Ok(Json(issue_tokens(&state, &user).await?))
}
