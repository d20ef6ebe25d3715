//! services/api/src/web/diagnostics.rs
//!
//! Handlers for the authenticated user's own account, diagnostics, answers,
//! report generation and exports.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use diagnostic_core::domain::{AnalysisPeriod, NewAnswer, NewDiagnostic};
use diagnostic_core::pipeline::load_owned_diagnostic;
use diagnostic_core::questions::all_questions;
use diagnostic_core::{check_quota, generate_report, subscription_info, Area};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::report_html::render_report;
use crate::web::dto::{
    DiagnosticResponse, DiagnosticWithDetails, GenerateResponse, QuestionResponse, UserResponse,
};
use crate::web::state::{AppState, CurrentUser};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateDiagnosticRequest {
    pub company_name: Option<String>,
    /// One of `last_week`, `last_month`, `last_quarter`, `last_semester`, `last_year`.
    pub analysis_period: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateDiagnosticResponse {
    pub id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct AnswerInput {
    pub area: String,
    pub question: String,
    /// Free text, a selected option or a number.
    #[schema(value_type = String)]
    pub answer: Value,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitAnswersRequest {
    pub answers: Option<Vec<AnswerInput>>,
}

#[derive(Serialize, ToSchema)]
pub struct SubmitAnswersResponse {
    pub success: bool,
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub plan_id: Option<Uuid>,
    pub remaining: i64,
    pub limit: i32,
}

//=========================================================================================
// Validation helpers
//=========================================================================================

fn answer_text(value: Value) -> Result<String, ApiError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ApiError::BadRequest(
            "Each answer must be a string or a number".into(),
        )),
    }
}

fn to_new_answers(inputs: Vec<AnswerInput>) -> Result<Vec<NewAnswer>, ApiError> {
    if inputs.is_empty() {
        return Err(ApiError::BadRequest("answers must be a non-empty array".into()));
    }
    inputs
        .into_iter()
        .map(|input| {
            let area = input
                .area
                .parse::<Area>()
                .map_err(|_| ApiError::BadRequest(format!("Unknown area '{}'", input.area)))?;
            let question = input.question.trim().to_string();
            if question.is_empty() {
                return Err(ApiError::BadRequest("Each answer needs a question".into()));
            }
            Ok(NewAnswer {
                area,
                question,
                answer: answer_text(input.answer)?,
            })
        })
        .collect()
}

/// `diagnostic-<company>-<millis>.pdf`, reduced to characters safe in a header.
fn pdf_file_name(company_name: &str, now: DateTime<Utc>) -> String {
    let company: String = company_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("diagnostic-{}-{}.pdf", company, now.timestamp_millis())
}

//=========================================================================================
// Account
//=========================================================================================

/// GET /me - The authenticated user
#[utoipa::path(
    get,
    path = "/me",
    tag = "account",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me_handler(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(user.into())
}

/// GET /me/subscription - Subscription state and remaining diagnostics
#[utoipa::path(
    get,
    path = "/me/subscription",
    tag = "account",
    responses(
        (status = 200, description = "Subscription and quota summary", body = SubscriptionResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn subscription_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let info = subscription_info(state.db.as_ref(), user.id, Utc::now()).await?;
    Ok(Json(SubscriptionResponse {
        is_active: info.subscription.is_active,
        start_date: info.subscription.start_date,
        end_date: info.subscription.end_date,
        plan_id: info.subscription.plan_id,
        remaining: info.remaining,
        limit: info.limit,
    }))
}

/// GET /questions - The questionnaire every diagnostic is answered against
#[utoipa::path(
    get,
    path = "/questions",
    tag = "diagnostics",
    responses(
        (status = 200, description = "Questions in area order", body = [QuestionResponse])
    )
)]
pub async fn questions_handler() -> Json<Vec<QuestionResponse>> {
    Json(all_questions().iter().map(QuestionResponse::from).collect())
}

//=========================================================================================
// Diagnostics
//=========================================================================================

/// GET /diagnostics - The caller's diagnostics, newest first
#[utoipa::path(
    get,
    path = "/diagnostics",
    tag = "diagnostics",
    responses(
        (status = 200, description = "Diagnostics of the current user", body = [DiagnosticResponse]),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_diagnostics_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<DiagnosticResponse>>, ApiError> {
    let diagnostics = state.db.list_user_diagnostics(user.id).await?;
    Ok(Json(
        diagnostics.into_iter().map(DiagnosticResponse::from).collect(),
    ))
}

/// POST /diagnostics - Create a diagnostic if the user still has quota
#[utoipa::path(
    post,
    path = "/diagnostics",
    tag = "diagnostics",
    request_body = CreateDiagnosticRequest,
    responses(
        (status = 201, description = "Diagnostic created", body = CreateDiagnosticResponse),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ErrorResponse),
        (status = 403, description = "Quota exhausted", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_diagnostic_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<CreateDiagnosticRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let company_name = req
        .company_name
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let (Some(company_name), Some(period)) = (company_name, req.analysis_period) else {
        return Err(ApiError::BadRequest(
            "company_name and analysis_period are required".into(),
        ));
    };
    let analysis_period = period
        .parse::<AnalysisPeriod>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let decision = check_quota(state.db.as_ref(), user.id, Utc::now()).await?;
    if !decision.can_create {
        let reason = decision
            .reason
            .unwrap_or_else(|| "Diagnostics limit reached".to_string());
        info!(user_id = %user.id, %reason, "Diagnostic creation refused");
        return Err(ApiError::Forbidden(reason));
    }

    let diagnostic = state
        .db
        .create_diagnostic(
            user.id,
            NewDiagnostic {
                company_name,
                analysis_period,
            },
        )
        .await?;
    info!(user_id = %user.id, diagnostic_id = %diagnostic.id, "Diagnostic created");

    Ok((
        StatusCode::CREATED,
        Json(CreateDiagnosticResponse { id: diagnostic.id }),
    ))
}

/// GET /diagnostics/{id} - A diagnostic with its answers
#[utoipa::path(
    get,
    path = "/diagnostics/{id}",
    tag = "diagnostics",
    params(("id" = Uuid, Path, description = "Diagnostic id")),
    responses(
        (status = 200, description = "Diagnostic and answers", body = DiagnosticWithDetails),
        (status = 404, description = "Not found or not owned by the caller", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_diagnostic_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DiagnosticWithDetails>, ApiError> {
    let Path(id) = path?;
    let diagnostic = load_owned_diagnostic(state.db.as_ref(), user.id, id).await?;
    let details = state.db.get_details(id).await?;
    Ok(Json(DiagnosticWithDetails::new(diagnostic, details)))
}

/// POST /diagnostics/{id}/answers - Replace every stored answer of a diagnostic
#[utoipa::path(
    post,
    path = "/diagnostics/{id}/answers",
    tag = "diagnostics",
    params(("id" = Uuid, Path, description = "Diagnostic id")),
    request_body = SubmitAnswersRequest,
    responses(
        (status = 200, description = "Answers stored", body = SubmitAnswersResponse),
        (status = 400, description = "Empty or invalid answers", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found or not owned by the caller", body = crate::error::ErrorResponse)
    )
)]
pub async fn submit_answers_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SubmitAnswersRequest>, JsonRejection>,
) -> Result<Json<SubmitAnswersResponse>, ApiError> {
    let Path(id) = path?;
    let Json(req) = payload?;
    let inputs = req
        .answers
        .ok_or_else(|| ApiError::BadRequest("answers must be an array".into()))?;

    load_owned_diagnostic(state.db.as_ref(), user.id, id).await?;
    let answers = to_new_answers(inputs)?;

    let count = state.db.replace_answers(id, answers).await?;
    info!(diagnostic_id = %id, count, "Answers replaced");
    Ok(Json(SubmitAnswersResponse {
        success: true,
        count,
    }))
}

/// POST /diagnostics/{id}/generate - Run the AI report pipeline
#[utoipa::path(
    post,
    path = "/diagnostics/{id}/generate",
    tag = "diagnostics",
    params(("id" = Uuid, Path, description = "Diagnostic id")),
    responses(
        (status = 200, description = "Report generated and stored", body = GenerateResponse),
        (status = 400, description = "The diagnostic has no answers", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found or not owned by the caller", body = crate::error::ErrorResponse),
        (status = 500, description = "The AI call failed or returned an unusable report", body = crate::error::ErrorResponse)
    )
)]
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Path(id) = path?;
    let report = generate_report(
        state.db.as_ref(),
        state.report_adapter.as_ref(),
        user.id,
        id,
        Utc::now(),
    )
    .await?;
    Ok(Json(GenerateResponse {
        success: true,
        result: report.into_json(),
    }))
}

/// GET /diagnostics/{id}/report - The report as a standalone HTML page
#[utoipa::path(
    get,
    path = "/diagnostics/{id}/report",
    tag = "diagnostics",
    params(("id" = Uuid, Path, description = "Diagnostic id")),
    responses(
        (status = 200, description = "HTML report", content_type = "text/html", body = String),
        (status = 404, description = "Not found or not owned by the caller", body = crate::error::ErrorResponse)
    )
)]
pub async fn report_html_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Html<String>, ApiError> {
    let Path(id) = path?;
    let diagnostic = load_owned_diagnostic(state.db.as_ref(), user.id, id).await?;
    let details = state.db.get_details(id).await?;
    Ok(Html(render_report(&diagnostic, &details, Utc::now())))
}

/// GET|POST /diagnostics/{id}/pdf - The report rendered as a PDF attachment
#[utoipa::path(
    get,
    path = "/diagnostics/{id}/pdf",
    tag = "diagnostics",
    params(("id" = Uuid, Path, description = "Diagnostic id")),
    responses(
        (status = 200, description = "PDF document", content_type = "application/pdf", body = Vec<u8>),
        (status = 404, description = "Not found or not owned by the caller", body = crate::error::ErrorResponse),
        (status = 503, description = "No PDF renderer configured", body = crate::error::ErrorResponse)
    )
)]
pub async fn pdf_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let diagnostic = load_owned_diagnostic(state.db.as_ref(), user.id, id).await?;
    let renderer = state
        .pdf_adapter
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("PDF generation is not configured".into()))?;

    let details = state.db.get_details(id).await?;
    let now = Utc::now();
    let html = render_report(&diagnostic, &details, now);
    let pdf = renderer.render_pdf(&html).await?;
    info!(diagnostic_id = %id, bytes = pdf.len(), "PDF rendered");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        pdf_file_name(&diagnostic.company_name, now)
    );
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    ))
}
