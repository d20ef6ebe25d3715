pub mod admin;
pub mod auth;
pub mod diagnostics;
pub mod dto;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use rest::ApiDoc;
use state::AppState;

pub use middleware::{require_admin, require_auth};

/// Builds the full application router: public, authenticated and admin routes,
/// Swagger UI, CORS and request tracing.
pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = HeaderValue::from_str(&app_state.config.cors_origin).map_err(|e| {
        ApiError::Internal(format!(
            "Invalid CORS origin '{}': {}",
            app_state.config.cors_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/questions", get(diagnostics::questions_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(diagnostics::me_handler))
        .route("/me/subscription", get(diagnostics::subscription_handler))
        .route(
            "/diagnostics",
            get(diagnostics::list_diagnostics_handler).post(diagnostics::create_diagnostic_handler),
        )
        .route("/diagnostics/{id}", get(diagnostics::get_diagnostic_handler))
        .route(
            "/diagnostics/{id}/answers",
            post(diagnostics::submit_answers_handler),
        )
        .route("/diagnostics/{id}/generate", post(diagnostics::generate_handler))
        .route("/diagnostics/{id}/report", get(diagnostics::report_html_handler))
        .route(
            "/diagnostics/{id}/pdf",
            get(diagnostics::pdf_handler).post(diagnostics::pdf_handler),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Admin routes (auth + active admin required)
    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users_handler))
        .route(
            "/admin/users/{id}",
            get(admin::get_user_handler).patch(admin::update_user_handler),
        )
        .route("/admin/diagnostics", get(admin::list_all_diagnostics_handler))
        .route("/admin/diagnostics/{id}", get(admin::get_any_diagnostic_handler))
        .route_layer(axum_middleware::from_fn(require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(app_state);

    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
