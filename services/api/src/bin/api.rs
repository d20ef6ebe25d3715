//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, GeminiReportAdapter, HttpPdfAdapter, OpenAiReportAdapter},
    config::{AiProvider, Config, ConfigError},
    error::ApiError,
    web::{build_router, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use diagnostic_core::ports::{PdfRenderingService, ReportGenerationService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Picks the report generator named by `AI_PROVIDER`.
fn report_adapter(config: &Config) -> Result<Arc<dyn ReportGenerationService>, ApiError> {
    match config.ai_provider {
        AiProvider::Gemini => {
            let api_key = config
                .gemini_api_key
                .clone()
                .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;
            Ok(Arc::new(GeminiReportAdapter::new(
                api_key,
                config.gemini_model.clone(),
                config.gemini_base_url.clone(),
                config.ai_temperature,
                config.ai_timeout_secs,
            )?))
        }
        AiProvider::OpenAi => {
            let api_key = config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
            let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
            if let Some(base) = &config.openai_base_url {
                openai_config = openai_config.with_api_base(base);
            }
            Ok(Arc::new(OpenAiReportAdapter::new(
                Client::with_config(openai_config),
                config.openai_model.clone(),
                config.ai_temperature,
            )))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let report_adapter = report_adapter(&config)?;
    info!(provider = report_adapter.provider(), "Report generator ready");

    let pdf_adapter: Option<Arc<dyn PdfRenderingService>> = match &config.pdf_renderer_url {
        Some(url) => {
            info!(renderer = %url, "PDF rendering enabled");
            Some(Arc::new(HttpPdfAdapter::new(
                url.clone(),
                config.ai_timeout_secs,
            )?))
        }
        None => {
            info!("PDF_RENDERER_URL not set; PDF export is disabled");
            None
        }
    };

    // --- 4. Build the Shared AppState and Router ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        report_adapter,
        pdf_adapter,
    });
    let app = build_router(app_state)?;

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
