//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification of the REST API.

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::web::{admin, auth, diagnostics, dto};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        diagnostics::me_handler,
        diagnostics::subscription_handler,
        diagnostics::questions_handler,
        diagnostics::list_diagnostics_handler,
        diagnostics::create_diagnostic_handler,
        diagnostics::get_diagnostic_handler,
        diagnostics::submit_answers_handler,
        diagnostics::generate_handler,
        diagnostics::report_html_handler,
        diagnostics::pdf_handler,
        admin::list_users_handler,
        admin::get_user_handler,
        admin::update_user_handler,
        admin::list_all_diagnostics_handler,
        admin::get_any_diagnostic_handler,
    ),
    components(
        schemas(
            ErrorResponse,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::AuthUser,
            auth::AuthResponse,
            auth::SuccessResponse,
            dto::UserResponse,
            dto::DiagnosticResponse,
            dto::DetailResponse,
            dto::DiagnosticWithDetails,
            dto::QuestionResponse,
            dto::GenerateResponse,
            dto::Pagination,
            diagnostics::CreateDiagnosticRequest,
            diagnostics::CreateDiagnosticResponse,
            diagnostics::AnswerInput,
            diagnostics::SubmitAnswersRequest,
            diagnostics::SubmitAnswersResponse,
            diagnostics::SubscriptionResponse,
            admin::UserListResponse,
            admin::UpdateUserRequest,
            admin::UpdateUserResponse,
            admin::AdminDiagnostic,
            admin::DiagnosticListResponse,
            admin::AdminDiagnosticDetail,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and logout."),
        (name = "account", description = "The authenticated user's profile and quota."),
        (name = "diagnostics", description = "Questionnaires, AI reports and exports."),
        (name = "admin", description = "Administration of users and diagnostics.")
    )
)]
pub struct ApiDoc;
