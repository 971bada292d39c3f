//! Middleware: bearer authentication and the admin gate.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use oiyn_common::auth::ACCESS_TOKEN;
use oiyn_common::error::OiynError;
use oiyn_common::models::user::Role;
use uuid::Uuid;

use crate::{AppState, auth};

/// Authentication context extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Extract and validate the JWT from the `Authorization: Bearer <token>` header.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, OiynError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(OiynError::Unauthorized)?;

    let claims = auth::validate_token(token, &state.auth.jwt_secret)
        .map_err(|_| OiynError::InvalidToken)?;

    // Refresh tokens are only good for /auth/refresh
    if claims.token_type != ACCESS_TOKEN {
        return Err(OiynError::InvalidToken);
    }

    let user_id = claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| OiynError::InvalidToken)?;

    request.extensions_mut().insert(AuthContext {
        user_id,
        name: claims.name,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

/// Reject callers whose token does not carry the `ADMIN` role.
///
/// Must run after [`auth_middleware`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, OiynError> {
    let auth = request
        .extensions()
        .get::<AuthContext>()
        .ok_or(OiynError::Unauthorized)?;
    if !auth.is_admin() {
        tracing::warn!(user_id = %auth.user_id, path = %request.uri().path(), "Admin route denied");
        return Err(OiynError::Forbidden);
    }
    Ok(next.run(request).await)
}
