//! Admin routes: posting moderation. Requires an `ADMIN` token.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    middleware,
    routing::get,
};
use oiyn_common::{
    error::OiynResult,
    models::posting::{Posting, PostingStatus, SetStatusRequest},
    pagination::{Page, PageQuery},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, middleware::AuthContext};

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/postings", get(list_postings))
        .route(
            "/admin/postings/{posting_id}",
            get(get_posting).post(set_status),
        )
        .route_layer(middleware::from_fn(crate::middleware::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth_middleware,
        ))
}

#[derive(Debug, Deserialize)]
struct AdminListQuery {
    status: Option<PostingStatus>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// GET /api/admin/postings: every posting, newest first.
async fn list_postings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> OiynResult<Json<Page<Posting>>> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(&state.limits);
    Ok(Json(state.engine.list_all(query.status, page).await?))
}

/// GET /api/admin/postings/{posting_id}
async fn get_posting(
    State(state): State<Arc<AppState>>,
    Path(posting_id): Path<Uuid>,
) -> OiynResult<Json<Posting>> {
    Ok(Json(state.engine.get_posting(posting_id).await?))
}

/// POST /api/admin/postings/{posting_id}: set any status, including `moderating`.
async fn set_status(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(posting_id): Path<Uuid>,
    Json(body): Json<SetStatusRequest>,
) -> OiynResult<Json<Posting>> {
    Ok(Json(
        state
            .engine
            .set_status(auth.user_id, posting_id, body.status)
            .await?,
    ))
}
