//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered to HTTP clients.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diagnostic_core::ports::PortError;
use diagnostic_core::ReportError;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a failure of the report generation pipeline.
    #[error("Report Error: {0}")]
    Report(#[from] ReportError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure to apply the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// The JSON body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

const INTERNAL_MESSAGE: &str = "Internal server error";

impl ApiError {
    /// Maps the error onto the status code and the message shown to the client.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            ApiError::Port(e) => match e {
                PortError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
                PortError::Conflict(m) | PortError::InvalidInput(m) => {
                    (StatusCode::BAD_REQUEST, m.clone())
                }
                PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Not authenticated".into()),
                PortError::Upstream(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
                PortError::InvalidResponse(_) | PortError::Unexpected(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.into())
                }
            },
            ApiError::Report(e) => match e {
                ReportError::NotFound => (StatusCode::NOT_FOUND, "Diagnostic not found".into()),
                ReportError::NoAnswers => (StatusCode::BAD_REQUEST, "No answers found".into()),
                ReportError::AiCall(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
                ReportError::InvalidResponse(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The AI response was not a valid diagnostic. Check the server logs.".into(),
                ),
                ReportError::Storage(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A storage error occurred while generating the diagnostic".into(),
                ),
            },
            ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Migration(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
