//! Health check endpoint: for load balancers and container health checks.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    store: String,
    uptime_secs: u64,
}

/// Health check router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_ok = state.db.health_check().await;

    Json(HealthResponse {
        status: if store_ok {
            "healthy".into()
        } else {
            "degraded".into()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: if state.db.is_persistent() {
            "postgres".into()
        } else {
            "memory".into()
        },
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
