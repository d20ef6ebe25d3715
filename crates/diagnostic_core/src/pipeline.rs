//! crates/diagnostic_core/src/pipeline.rs
//!
//! Turns a diagnostic's stored answers into a generated, persisted report.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Diagnostic, DiagnosticDetail};
use crate::ports::{DatabaseService, PortError, ReportGenerationService};
use crate::report::{build_prompt, parse_report, AreaScore, DiagnosticReport};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Diagnostic not found")]
    NotFound,
    #[error("No answers found")]
    NoAnswers,
    /// The model could not be reached or reported an error; carries its message.
    #[error("{0}")]
    AiCall(String),
    /// The model answered with something that is not a usable report.
    #[error("The AI response was not a valid diagnostic: {0}")]
    InvalidResponse(String),
    #[error("Storage error: {0}")]
    Storage(#[from] PortError),
}

/// Loads a diagnostic, hiding diagnostics owned by other users.
pub async fn load_owned_diagnostic(
    db: &dyn DatabaseService,
    user_id: Uuid,
    diagnostic_id: Uuid,
) -> Result<Diagnostic, PortError> {
    let diagnostic = db.get_diagnostic(diagnostic_id).await?;
    if diagnostic.user_id != user_id {
        return Err(PortError::NotFound(format!(
            "Diagnostic {} not found",
            diagnostic_id
        )));
    }
    Ok(diagnostic)
}

/// Feedback text stored on the answers of an area.
pub fn area_feedback(score: &AreaScore) -> String {
    format!("Score: {}/100", score.score.round())
}

/// Runs the full generation for one diagnostic.
///
/// Nothing is written unless the model's reply passes validation; a failure at
/// any earlier step leaves the diagnostic as it was.
pub async fn generate_report(
    db: &dyn DatabaseService,
    ai: &dyn ReportGenerationService,
    user_id: Uuid,
    diagnostic_id: Uuid,
    now: DateTime<Utc>,
) -> Result<DiagnosticReport, ReportError> {
    let diagnostic = match load_owned_diagnostic(db, user_id, diagnostic_id).await {
        Ok(d) => d,
        Err(PortError::NotFound(_)) => return Err(ReportError::NotFound),
        Err(e) => return Err(e.into()),
    };

    let answers = db.get_details(diagnostic_id).await?;
    if answers.is_empty() {
        return Err(ReportError::NoAnswers);
    }

    let prompt = build_prompt(&diagnostic, &answers);
    info!(
        %diagnostic_id,
        provider = ai.provider(),
        answers = answers.len(),
        prompt_length = prompt.len(),
        "Requesting diagnostic report"
    );

    let text = ai.generate_report_text(&prompt).await.map_err(|e| match e {
        PortError::InvalidResponse(msg) => ReportError::InvalidResponse(msg),
        PortError::Upstream(msg) => ReportError::AiCall(msg),
        other => ReportError::AiCall(other.to_string()),
    })?;

    let report = parse_report(&text).map_err(|e| {
        warn!(%diagnostic_id, error = %e, "AI response failed validation");
        ReportError::InvalidResponse(e.to_string())
    })?;

    db.complete_diagnostic(
        diagnostic_id,
        report.stored_score(),
        &report.strategic_reading,
        now,
    )
    .await?;

    apply_area_feedback(db, diagnostic_id, &report.area_scores, &answers).await;

    info!(%diagnostic_id, score = report.stored_score(), "Diagnostic completed");
    Ok(report)
}

/// Writes per-area feedback concurrently. Failures are logged and otherwise ignored.
async fn apply_area_feedback(
    db: &dyn DatabaseService,
    diagnostic_id: Uuid,
    areas: &[AreaScore],
    answers: &[DiagnosticDetail],
) {
    let updates = areas.iter().map(|area| async move {
        let feedback = area_feedback(area);
        let result = db
            .set_area_feedback(diagnostic_id, area.name.trim(), &feedback)
            .await;
        (area.name.as_str(), result)
    });

    for (area, result) in join_all(updates).await {
        match result {
            Ok(0) if !answers.iter().any(|a| a.area.eq_ignore_ascii_case(area.trim())) => {
                warn!(%diagnostic_id, area, "AI scored an area with no stored answers");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%diagnostic_id, area, error = %e, "Failed to store area feedback");
            }
        }
    }
}
