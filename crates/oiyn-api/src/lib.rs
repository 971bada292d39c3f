//! # oiyn-api
//!
//! REST API layer for Oiyn. Exposes postings, joining, chats, venues, and
//! accounts over HTTP; all matchmaking rules are delegated to oiyn-engine.

pub mod auth;
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use oiyn_common::config::{AuthConfig, LimitsConfig};
use oiyn_db::Database;
use oiyn_engine::{ChatRooms, MatchmakingEngine};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: MatchmakingEngine,
    pub chats: ChatRooms,
    pub auth: AuthConfig,
    pub limits: LimitsConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Database, auth: AuthConfig, limits: LimitsConfig) -> Self {
        Self {
            engine: MatchmakingEngine::new(db.clone()),
            chats: ChatRooms::new(db.clone(), limits.max_message_length as usize),
            db,
            auth,
            limits,
            started_at: Instant::now(),
        }
    }
}

/// Build the complete API router with all routes and middleware.
///
/// A request that outlives `request_timeout` is answered with 408 and its
/// handler future is dropped. Dropping the future does not stop a statement
/// already sent to PostgreSQL; the server-side `statement_timeout` set in
/// [`oiyn_db::Database::connect`] bounds it instead.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let state = Arc::new(state);

    let api_routes = Router::new()
        .merge(routes::auth::router())
        .merge(routes::users::router(state.clone()))
        .merge(routes::postings::router(state.clone()))
        .merge(routes::chats::router(state.clone()))
        .merge(routes::admin::router(state.clone()))
        .merge(routes::venues::router(state.clone()))
        .merge(routes::health::router());

    Router::new()
        .nest("/api", api_routes)
        .layer(tower_http::timeout::TimeoutLayer::new(request_timeout))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(state)
}
