//! crates/diagnostic_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    Diagnostic, DiagnosticDetail, DiagnosticFilter, NewAnswer, NewDiagnostic, NewUser, Page,
    Subscription, User, UserCredentials, UserFilter, UserUpdate,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// The remote service was reached (or attempted) and reported a failure.
    #[error("{0}")]
    Upstream(String),
    /// The remote service answered, but not with anything usable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn list_users(&self, filter: &UserFilter) -> PortResult<Page<User>>;

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User>;

    async fn get_user_emails(&self, user_ids: &[Uuid]) -> PortResult<HashMap<Uuid, String>>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Subscriptions ---
    /// Most recent subscription still flagged `active`, ordered by end date.
    async fn latest_active_subscription(&self, user_id: Uuid) -> PortResult<Option<Subscription>>;

    async fn mark_subscription_expired(&self, subscription_id: Uuid) -> PortResult<()>;

    // --- Diagnostics ---
    async fn create_diagnostic(
        &self,
        user_id: Uuid,
        diagnostic: NewDiagnostic,
    ) -> PortResult<Diagnostic>;

    async fn get_diagnostic(&self, diagnostic_id: Uuid) -> PortResult<Diagnostic>;

    async fn list_user_diagnostics(&self, user_id: Uuid) -> PortResult<Vec<Diagnostic>>;

    async fn list_diagnostics(&self, filter: &DiagnosticFilter) -> PortResult<Page<Diagnostic>>;

    /// Counts diagnostics created by the user, optionally restricted to an
    /// inclusive `[start, end]` window on `created_at`.
    async fn count_user_diagnostics(
        &self,
        user_id: Uuid,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> PortResult<i64>;

    /// Stores a generated report and moves the diagnostic to `completed`.
    async fn complete_diagnostic(
        &self,
        diagnostic_id: Uuid,
        general_score: i32,
        strategic_reading: &str,
        realized_at: DateTime<Utc>,
    ) -> PortResult<()>;

    // --- Answers ---
    /// Deletes every stored answer of the diagnostic and inserts `answers` in one step.
    async fn replace_answers(&self, diagnostic_id: Uuid, answers: Vec<NewAnswer>)
        -> PortResult<usize>;

    async fn get_details(&self, diagnostic_id: Uuid) -> PortResult<Vec<DiagnosticDetail>>;

    /// Sets `ai_feedback` on the details of one area (matched case-insensitively).
    /// Returns the number of rows touched.
    async fn set_area_feedback(
        &self,
        diagnostic_id: Uuid,
        area: &str,
        feedback: &str,
    ) -> PortResult<u64>;
}

#[async_trait]
pub trait ReportGenerationService: Send + Sync {
    /// Short provider name used in logs.
    fn provider(&self) -> &str;

    /// Sends the prompt to the model in JSON mode and returns the raw text it produced.
    ///
    /// Transport or provider failures are `PortError::Upstream` carrying the provider's
    /// message; a reply without any text is `PortError::InvalidResponse`.
    async fn generate_report_text(&self, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait PdfRenderingService: Send + Sync {
    /// Converts a self-contained HTML document into PDF bytes.
    async fn render_pdf(&self, html: &str) -> PortResult<Vec<u8>>;
}
