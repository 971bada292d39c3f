//! Chat routes. Every operation is limited to current members.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
};
use oiyn_common::{
    error::OiynResult,
    models::conversation::{Conversation, Message, SendMessageRequest},
    validation::validate_request,
};
use uuid::Uuid;

use crate::{AppState, middleware::AuthContext};

/// Chat routes (all require authentication).
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/me/chats", get(my_chats))
        .route("/chats/{chat_id}", get(get_chat))
        .route("/chats/{chat_id}/leave", delete(leave_chat))
        .route("/chats/{chat_id}/messages", post(send_message))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth_middleware,
        ))
}

/// GET /api/users/me/chats
async fn my_chats(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> OiynResult<Json<Vec<Conversation>>> {
    Ok(Json(state.chats.list_for_member(auth.user_id).await?))
}

/// GET /api/chats/{chat_id}
async fn get_chat(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
) -> OiynResult<Json<Conversation>> {
    Ok(Json(state.chats.get_for_member(auth.user_id, chat_id).await?))
}

/// DELETE /api/chats/{chat_id}/leave: posting membership is unaffected.
async fn leave_chat(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
) -> OiynResult<StatusCode> {
    state.chats.leave(auth.user_id, chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/chats/{chat_id}/messages
async fn send_message(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> OiynResult<(StatusCode, Json<Message>)> {
    validate_request(&body)?;
    let message = state
        .chats
        .send_message(auth.user_id, chat_id, &body.text)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
