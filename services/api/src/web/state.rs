//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use diagnostic_core::ports::{DatabaseService, PdfRenderingService, ReportGenerationService};
use diagnostic_core::User;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub report_adapter: Arc<dyn ReportGenerationService>,
    /// `None` when no HTML-to-PDF renderer is configured.
    pub pdf_adapter: Option<Arc<dyn PdfRenderingService>>,
}

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);
