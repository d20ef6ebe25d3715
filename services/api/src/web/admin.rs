//! services/api/src/web/admin.rs
//!
//! Admin-only endpoints for browsing and editing users and diagnostics.
//! Every route here sits behind `require_auth` and `require_admin`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use diagnostic_core::domain::{
    DiagnosticFilter, DiagnosticStatus, PageRequest, UserFilter, UserRole, UserStatus, UserUpdate,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::auth::{hash_password, normalize_email, MIN_PASSWORD_LEN};
use crate::web::dto::{DetailResponse, DiagnosticResponse, Pagination, UserResponse};
use crate::web::state::{AppState, CurrentUser};

const MISSING_EMAIL: &str = "N/A";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Case-insensitive substring of the email.
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub pagination: Pagination,
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    /// `null` clears the name.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub name: Option<Option<String>>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub diagnostics_limit: Option<i64>,
    pub password: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UpdateUserResponse {
    pub user: UserResponse,
    pub message: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DiagnosticListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub user_id: Option<Uuid>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (midnight UTC), inclusive.
    pub start_date: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (midnight UTC), inclusive.
    pub end_date: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AdminDiagnostic {
    pub user_email: String,
    #[serde(flatten)]
    pub diagnostic: DiagnosticResponse,
}

#[derive(Serialize, ToSchema)]
pub struct DiagnosticListResponse {
    pub diagnostics: Vec<AdminDiagnostic>,
    pub pagination: Pagination,
}

#[derive(Serialize, ToSchema)]
pub struct AdminDiagnosticDetail {
    pub user_email: String,
    #[serde(flatten)]
    pub diagnostic: DiagnosticResponse,
    pub details: Vec<DetailResponse>,
}

//=========================================================================================
// Parsing helpers
//=========================================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_date(name: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is not a valid date", name)))
}

fn to_user_update(req: UpdateUserRequest) -> Result<UserUpdate, ApiError> {
    let email = match non_empty(req.email) {
        Some(email) if !email.contains('@') => {
            return Err(ApiError::BadRequest("A valid email is required".into()))
        }
        other => other.map(|e| normalize_email(&e)),
    };
    let role = req
        .role
        .map(|r| r.parse::<UserRole>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let status = req
        .status
        .map(|s| s.parse::<UserStatus>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let diagnostics_limit = req
        .diagnostics_limit
        .map(|limit| {
            i32::try_from(limit)
                .ok()
                .filter(|l| *l >= 0)
                .ok_or_else(|| {
                    ApiError::BadRequest("diagnostics_limit must be a non-negative integer".into())
                })
        })
        .transpose()?;
    let password_hash = match req.password {
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => {
            return Err(ApiError::BadRequest(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )))
        }
        Some(p) => Some(hash_password(&p)?),
        None => None,
    };

    Ok(UserUpdate {
        email,
        name: req.name.map(non_empty),
        role,
        status,
        diagnostics_limit,
        password_hash,
    })
}

//=========================================================================================
// Users
//=========================================================================================

/// GET /admin/users - Paginated user list, newest first
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    params(UserListQuery),
    responses(
        (status = 200, description = "A page of users", body = UserListResponse),
        (status = 403, description = "Admin access required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UserListQuery>, QueryRejection>,
) -> Result<Json<UserListResponse>, ApiError> {
    let Query(query) = query?;
    let filter = UserFilter {
        search: non_empty(query.search),
        page: PageRequest::new(query.page, query.limit),
    };
    let page = state.db.list_users(&filter).await?;

    Ok(Json(UserListResponse {
        users: page.items.into_iter().map(UserResponse::from).collect(),
        pagination: Pagination::new(filter.page, page.total),
    }))
}

/// GET /admin/users/{id} - A single user
#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "The user", body = UserResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Path(id) = path?;
    let user = state.db.get_user_by_id(id).await?;
    Ok(Json(user.into()))
}

/// PATCH /admin/users/{id} - Partial update of a user
#[utoipa::path(
    patch,
    path = "/admin/users/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UpdateUserResponse),
        (status = 400, description = "Invalid fields", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UpdateUserResponse>, ApiError> {
    let Path(id) = path?;
    let Json(req) = payload?;
    let update = to_user_update(req)?;

    let user = state.db.update_user(id, update).await?;
    info!(admin_id = %admin.id, user_id = %id, "User updated by admin");

    Ok(Json(UpdateUserResponse {
        user: user.into(),
        message: "User updated successfully".to_string(),
    }))
}

//=========================================================================================
// Diagnostics
//=========================================================================================

/// GET /admin/diagnostics - Paginated, filterable list of every diagnostic
#[utoipa::path(
    get,
    path = "/admin/diagnostics",
    tag = "admin",
    params(DiagnosticListQuery),
    responses(
        (status = 200, description = "A page of diagnostics with owner emails", body = DiagnosticListResponse),
        (status = 400, description = "Invalid filter", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_all_diagnostics_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DiagnosticListQuery>, QueryRejection>,
) -> Result<Json<DiagnosticListResponse>, ApiError> {
    let Query(query) = query?;
    let status = non_empty(query.status)
        .map(|s| s.parse::<DiagnosticStatus>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let start_date = non_empty(query.start_date)
        .map(|d| parse_date("start_date", &d))
        .transpose()?;
    let end_date = non_empty(query.end_date)
        .map(|d| parse_date("end_date", &d))
        .transpose()?;

    let filter = DiagnosticFilter {
        status,
        user_id: query.user_id,
        start_date,
        end_date,
        page: PageRequest::new(query.page, query.limit),
    };
    let page = state.db.list_diagnostics(&filter).await?;

    let mut user_ids: Vec<Uuid> = page.items.iter().map(|d| d.user_id).collect();
    user_ids.sort_unstable();
    user_ids.dedup();
    let emails = state.db.get_user_emails(&user_ids).await?;

    let diagnostics = page
        .items
        .into_iter()
        .map(|d| AdminDiagnostic {
            user_email: emails
                .get(&d.user_id)
                .cloned()
                .unwrap_or_else(|| MISSING_EMAIL.to_string()),
            diagnostic: d.into(),
        })
        .collect();

    Ok(Json(DiagnosticListResponse {
        diagnostics,
        pagination: Pagination::new(filter.page, page.total),
    }))
}

/// GET /admin/diagnostics/{id} - Any diagnostic with its answers and owner email
#[utoipa::path(
    get,
    path = "/admin/diagnostics/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Diagnostic id")),
    responses(
        (status = 200, description = "Diagnostic, owner email and answers", body = AdminDiagnosticDetail),
        (status = 404, description = "Diagnostic not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_any_diagnostic_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<AdminDiagnosticDetail>, ApiError> {
    let Path(id) = path?;
    let diagnostic = state.db.get_diagnostic(id).await?;
    let details = state.db.get_details(id).await?;
    let user_email = state
        .db
        .get_user_emails(&[diagnostic.user_id])
        .await?
        .remove(&diagnostic.user_id)
        .unwrap_or_else(|| MISSING_EMAIL.to_string());

    Ok(Json(AdminDiagnosticDetail {
        user_email,
        diagnostic: diagnostic.into(),
        details: details.into_iter().map(DetailResponse::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_accept_rfc3339_and_plain_days() {
        let day = parse_date("start_date", "2024-02-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-02-01T00:00:00+00:00");
        let ts = parse_date("end_date", "2024-02-01T12:30:00-03:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-02-01T15:30:00+00:00");
        assert!(parse_date("start_date", "yesterday").is_err());
    }

    #[test]
    fn update_distinguishes_missing_and_null_name() {
        let req: UpdateUserRequest = serde_json::from_str(r#"{"name": null}"#).unwrap();
        assert_eq!(to_user_update(req).unwrap().name, Some(None));

        let req: UpdateUserRequest = serde_json::from_str(r#"{"role": "admin"}"#).unwrap();
        let update = to_user_update(req).unwrap();
        assert_eq!(update.name, None);
        assert_eq!(update.role, Some(UserRole::Admin));
    }

    #[test]
    fn update_validates_fields() {
        let bad = [
            r#"{"diagnostics_limit": -1}"#,
            r#"{"password": "12345"}"#,
            r#"{"status": "deleted"}"#,
            r#"{"email": "not-an-email"}"#,
        ];
        for body in bad {
            let req: UpdateUserRequest = serde_json::from_str(body).unwrap();
            assert!(to_user_update(req).is_err(), "{body}");
        }

        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"email": " New@Example.COM ", "diagnostics_limit": 0}"#)
                .unwrap();
        let update = to_user_update(req).unwrap();
        assert_eq!(update.email.as_deref(), Some("new@example.com"));
        assert_eq!(update.diagnostics_limit, Some(0));
    }
}
