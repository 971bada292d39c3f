//! User routes: own profile and hosted postings.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    middleware,
    routing::get,
};
use chrono::Utc;
use oiyn_common::{
    error::{OiynError, OiynResult},
    models::posting::{Posting, PostingStatus},
    models::user::{ProfileChanges, UpdateProfileRequest, UserResponse},
    pagination::{Page, PageQuery},
    validation::validate_request,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, middleware::AuthContext};

/// User routes (all require authentication).
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/me", get(get_current_user).patch(update_current_user))
        .route("/users/{user_id}/postings", get(hosted_postings))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth_middleware,
        ))
}

/// GET /api/users/me
async fn get_current_user(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> OiynResult<Json<UserResponse>> {
    let user = state
        .db
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| OiynError::not_found("User"))?;

    Ok(Json(user.into()))
}

/// PATCH /api/users/me: sparse profile update; blank fields are ignored.
///
/// Snapshots already embedded in postings and chats keep the old values.
async fn update_current_user(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateProfileRequest>,
) -> OiynResult<Json<UserResponse>> {
    validate_request(&body)?;
    let changes = ProfileChanges::from(body);

    let user = state
        .db
        .users
        .update_profile(auth.user_id, &changes, Utc::now())
        .await?
        .ok_or_else(|| OiynError::not_found("User"))?;

    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct HostedQuery {
    status: Option<PostingStatus>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// GET /api/users/{user_id}/postings: `me` resolves to the caller.
async fn hosted_postings(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<HostedQuery>,
) -> OiynResult<Json<Page<Posting>>> {
    let host_id = if user_id == "me" {
        auth.user_id
    } else {
        user_id
            .parse::<Uuid>()
            .map_err(|_| OiynError::validation("Invalid user id"))?
    };

    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(&state.limits);

    Ok(Json(
        state.engine.list_hosted(host_id, query.status, page).await?,
    ))
}
