//! services/api/src/web/dto.rs
//!
//! JSON representations of the core domain types shared by the user and admin routes.

use chrono::{DateTime, Utc};
use diagnostic_core::domain::{Diagnostic, DiagnosticDetail, PageRequest, User};
use diagnostic_core::questions::{Question, QuestionType};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// A user as exposed over the API. Never carries the password.
#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub status: String,
    pub diagnostics_limit: Option<i32>,
    pub current_plan_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role.to_string(),
            status: user.status.to_string(),
            diagnostics_limit: user.diagnostics_limit,
            current_plan_id: user.current_plan_id,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DiagnosticResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub analysis_period: String,
    pub status: String,
    pub general_score: Option<i32>,
    pub strategic_reading: Option<String>,
    pub pdf_report_url: Option<String>,
    pub realization_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Diagnostic> for DiagnosticResponse {
    fn from(d: Diagnostic) -> Self {
        Self {
            id: d.id,
            user_id: d.user_id,
            company_name: d.company_name,
            analysis_period: d.analysis_period.to_string(),
            status: d.status.to_string(),
            general_score: d.general_score,
            strategic_reading: d.strategic_reading,
            pdf_report_url: d.pdf_report_url,
            realization_date: d.realization_date,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DetailResponse {
    pub id: Uuid,
    pub diagnostic_id: Uuid,
    pub area: String,
    pub question: String,
    pub answer: String,
    pub ai_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DiagnosticDetail> for DetailResponse {
    fn from(d: DiagnosticDetail) -> Self {
        Self {
            id: d.id,
            diagnostic_id: d.diagnostic_id,
            area: d.area,
            question: d.question,
            answer: d.answer,
            ai_feedback: d.ai_feedback,
            created_at: d.created_at,
        }
    }
}

/// A diagnostic together with its stored answers.
#[derive(Serialize, ToSchema)]
pub struct DiagnosticWithDetails {
    #[serde(flatten)]
    pub diagnostic: DiagnosticResponse,
    pub details: Vec<DetailResponse>,
}

impl DiagnosticWithDetails {
    pub fn new(diagnostic: Diagnostic, details: Vec<DiagnosticDetail>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
            details: details.into_iter().map(DetailResponse::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuestionResponse {
    pub area: String,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl From<&Question> for QuestionResponse {
    fn from(q: &Question) -> Self {
        Self {
            area: q.area.to_string(),
            question: q.question.to_string(),
            kind: match q.kind {
                QuestionType::Text => "text",
                QuestionType::Select => "select",
                QuestionType::Number => "number",
            }
            .to_string(),
            options: q.options.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// The AI report returned by `/diagnostics/{id}/generate`, as the model produced it.
#[derive(Serialize, ToSchema)]
pub struct GenerateResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub result: serde_json::Value,
}

#[derive(Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages: request.total_pages(total),
        }
    }
}
