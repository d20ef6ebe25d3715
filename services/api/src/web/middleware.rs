//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use diagnostic_core::domain::UserStatus;
use diagnostic_core::ports::PortError;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::web::auth::session_cookie;
use crate::web::state::{AppState, CurrentUser};

const NOT_AUTHENTICATED: &str = "Not authenticated";

/// Middleware that validates the session cookie and loads the caller.
///
/// If valid, inserts a `CurrentUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_cookie(req.headers())
        .ok_or_else(|| ApiError::Unauthorized(NOT_AUTHENTICATED.into()))?;

    let user_id = match state.db.validate_auth_session(token).await {
        Ok(id) => id,
        Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
            debug!("Rejected unknown or expired session");
            return Err(ApiError::Unauthorized(NOT_AUTHENTICATED.into()));
        }
        Err(e) => return Err(e.into()),
    };

    let user = match state.db.get_user_by_id(user_id).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => {
            return Err(ApiError::Unauthorized(NOT_AUTHENTICATED.into()))
        }
        Err(e) => return Err(e.into()),
    };
    if user.status == UserStatus::Blocked {
        return Err(ApiError::Forbidden("This account has been blocked".into()));
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Middleware for admin routes; must run after `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::Unauthorized(NOT_AUTHENTICATED.into()))?;

    if !user.0.is_active_admin() {
        warn!(user_id = %user.0.id, "Non-admin request to an admin route");
        return Err(ApiError::Forbidden("Admin access required".into()));
    }
    Ok(next.run(req).await)
}
