//! Venue routes: admin-managed anticafés.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::get,
};
use chrono::Utc;
use oiyn_common::{
    error::{OiynError, OiynResult},
    id::generate_id,
    models::venue::{CreateVenueRequest, UpdateVenueRequest, Venue, VenueChanges},
    pagination::{Page, PageQuery},
    validation::{require_text, validate_request},
};
use uuid::Uuid;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/venues", get(list_venues).post(create_venue))
        .route(
            "/admin/venues/{venue_id}",
            get(get_venue).patch(update_venue),
        )
        .route_layer(middleware::from_fn(crate::middleware::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth_middleware,
        ))
}

/// POST /api/admin/venues
async fn create_venue(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateVenueRequest>,
) -> OiynResult<(StatusCode, Json<Venue>)> {
    validate_request(&body)?;
    require_text("title", &body.title)?;
    require_text("address", &body.address)?;
    require_text("phone_number", &body.phone_number)?;

    let venue = state
        .db
        .venues
        .insert(body.into_venue(generate_id(), Utc::now()))
        .await?;

    tracing::info!(venue_id = %venue.id, "Venue created");
    Ok((StatusCode::CREATED, Json(venue)))
}

/// GET /api/admin/venues
async fn list_venues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> OiynResult<Json<Page<Venue>>> {
    let page = query.resolve(&state.limits);
    let (items, total) = state.db.venues.list(page).await?;
    Ok(Json(Page::new(items, total, page)))
}

/// GET /api/admin/venues/{venue_id}
async fn get_venue(
    State(state): State<Arc<AppState>>,
    Path(venue_id): Path<Uuid>,
) -> OiynResult<Json<Venue>> {
    let venue = state
        .db
        .venues
        .find_by_id(venue_id)
        .await?
        .ok_or_else(|| OiynError::not_found("Venue"))?;
    Ok(Json(venue))
}

/// PATCH /api/admin/venues/{venue_id}: sparse update.
async fn update_venue(
    State(state): State<Arc<AppState>>,
    Path(venue_id): Path<Uuid>,
    Json(body): Json<UpdateVenueRequest>,
) -> OiynResult<Json<Venue>> {
    validate_request(&body)?;
    let changes = VenueChanges::from(body);

    let venue = state
        .db
        .venues
        .update(venue_id, &changes, Utc::now())
        .await?
        .ok_or_else(|| OiynError::not_found("Venue"))?;
    Ok(Json(venue))
}
