//! Posting routes: create, browse, join, edit.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use oiyn_common::{
    error::OiynResult,
    models::posting::{
        CreatePostingRequest, FilterValues, JoinPostingRequest, Posting, UpdatePostingRequest,
    },
    pagination::{Page, PageQuery},
    validation::non_blank,
};
use oiyn_db::repository::{PostingFilter, SortOrder};
use oiyn_engine::JoinOutcome;
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, middleware::AuthContext};

/// Posting routes (all require authentication).
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/postings", post(create_posting).get(list_postings))
        .route("/postings/filters", get(filter_values))
        .route("/postings/join", put(join_posting))
        .route("/postings/{posting_id}", get(get_posting).patch(update_posting))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth_middleware,
        ))
}

/// POST /api/postings
async fn create_posting(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePostingRequest>,
) -> OiynResult<(StatusCode, Json<Posting>)> {
    let posting = state.engine.create_posting(auth.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(posting)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    city: Option<String>,
    category: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    sort: Option<SortOrder>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// GET /api/postings: active postings the caller could join.
async fn list_postings(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> OiynResult<Json<Page<Posting>>> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(&state.limits);

    let filter = PostingFilter {
        city: non_blank(query.city),
        category: non_blank(query.category),
        scheduled_from: query.from,
        scheduled_to: query.to,
        sort: query.sort.unwrap_or_default(),
        ..Default::default()
    };

    Ok(Json(state.engine.list_open(auth.user_id, filter, page).await?))
}

/// GET /api/postings/filters: distinct cities and categories.
async fn filter_values(State(state): State<Arc<AppState>>) -> OiynResult<Json<FilterValues>> {
    Ok(Json(state.engine.filter_values().await?))
}

/// GET /api/postings/{posting_id}
async fn get_posting(
    State(state): State<Arc<AppState>>,
    Path(posting_id): Path<Uuid>,
) -> OiynResult<Json<Posting>> {
    Ok(Json(state.engine.get_posting(posting_id).await?))
}

/// PUT /api/postings/join: take a seat; opens the chat when it was the last one.
async fn join_posting(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<JoinPostingRequest>,
) -> OiynResult<Json<JoinOutcome>> {
    Ok(Json(
        state
            .engine
            .join_posting(auth.user_id, body.posting_id)
            .await?,
    ))
}

/// PATCH /api/postings/{posting_id}: host-only sparse edit.
async fn update_posting(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(posting_id): Path<Uuid>,
    Json(body): Json<UpdatePostingRequest>,
) -> OiynResult<Json<Posting>> {
    Ok(Json(
        state
            .engine
            .update_posting(auth.user_id, posting_id, body)
            .await?,
    ))
}
