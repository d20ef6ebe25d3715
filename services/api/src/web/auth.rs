//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user registration, login, and logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use diagnostic_core::domain::{NewUser, UserStatus, DEFAULT_DIAGNOSTICS_LIMIT};
use diagnostic_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";
pub const MIN_PASSWORD_LEN: usize = 6;
const INVALID_CREDENTIALS: &str = "Invalid email or password";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub user: AuthUser,
}

#[derive(Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

//=========================================================================================
// Helpers
//=========================================================================================

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))
}

/// Checks a password against the stored value. Rows created before hashing was
/// introduced hold the password itself and are compared directly.
fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => password == stored,
    }
}

/// Opaque session token: base64 of the user id, the login instant and a nonce.
fn new_session_token(user_id: Uuid) -> String {
    let raw = format!(
        "{}:{}:{}",
        user_id,
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    );
    STANDARD.encode(raw)
}

/// Reads the session token from the `Cookie` header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

fn session_set_cookie(config: &Config, token: &str, max_age_secs: i64) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request or email already registered", body = crate::error::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::error::ErrorResponse)
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let email = normalize_email(&req.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("A valid email is required".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let new_user = NewUser {
        email,
        name: req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        password_hash: hash_password(&req.password)?,
        diagnostics_limit: DEFAULT_DIAGNOSTICS_LIMIT,
    };

    let user = state.db.create_user(new_user).await?;
    info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            user: AuthUser {
                id: user.id,
                email: user.email,
                name: None,
                role: None,
            },
        }),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; sets the session cookie", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 403, description = "Account blocked", body = crate::error::ErrorResponse)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let email = normalize_email(&req.email);
    let credentials = match state.db.get_credentials_by_email(&email).await {
        Ok(c) => c,
        Err(PortError::NotFound(_)) => {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()))
        }
        Err(e) => return Err(e.into()),
    };

    let valid = credentials
        .password
        .as_deref()
        .is_some_and(|stored| verify_password(&req.password, stored));
    if !valid {
        warn!(user_id = %credentials.user.id, "Failed login attempt");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let user = credentials.user;
    if user.status == UserStatus::Blocked {
        return Err(ApiError::Forbidden("This account has been blocked".into()));
    }

    let token = new_session_token(user.id);
    let ttl = Duration::days(state.config.session_ttl_days);
    state
        .db
        .create_auth_session(&token, user.id, Utc::now() + ttl)
        .await?;
    info!(user_id = %user.id, "User logged in");

    let cookie = session_set_cookie(&state.config, &token, ttl.num_seconds());
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            success: true,
            user: AuthUser {
                id: user.id,
                email: user.email,
                name: user.name,
                role: Some(user.role.to_string()),
            },
        }),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful; clears the session cookie", body = SuccessResponse)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = session_cookie(&headers) {
        state.db.delete_auth_session(token).await?;
    }

    let cookie = session_set_cookie(&state.config, "", 0);
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(SuccessResponse { success: true }),
    ))
}
