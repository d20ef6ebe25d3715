//! services/api/src/report_html.rs
//!
//! Renders a diagnostic and its answers as a standalone HTML document. The same
//! document is served at `/diagnostics/{id}/report` and sent to the PDF renderer.

use chrono::{DateTime, Utc};
use diagnostic_core::domain::{Area, Diagnostic, DiagnosticDetail};
use std::collections::BTreeMap;

const TEMPLATE: &str = include_str!("../templates/diagnostic_report.html");

/// Score band shown under the number.
pub fn score_label(score: i32) -> &'static str {
    match score {
        s if s >= 80 => "Excellent",
        s if s >= 60 => "Good",
        _ => "Needs improvement",
    }
}

pub fn score_color(score: i32) -> &'static str {
    match score {
        s if s >= 80 => "#10b981",
        s if s >= 60 => "#f59e0b",
        _ => "#ef4444",
    }
}

/// Escapes text for inclusion in HTML element content or attributes.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn display_area(area: &str) -> String {
    match area.parse::<Area>() {
        Ok(known) => {
            let name = known.as_str();
            let mut chars = name.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect())
                .unwrap_or_default()
        }
        Err(_) if area.trim().is_empty() => "General".to_string(),
        Err(_) => area.trim().to_string(),
    }
}

/// Answers grouped by area, known areas first in questionnaire order.
fn render_areas(details: &[DiagnosticDetail]) -> String {
    let mut known: BTreeMap<Area, Vec<&DiagnosticDetail>> = BTreeMap::new();
    let mut other: BTreeMap<String, Vec<&DiagnosticDetail>> = BTreeMap::new();
    for detail in details {
        match detail.area.parse::<Area>() {
            Ok(area) => known.entry(area).or_default().push(detail),
            Err(_) => other.entry(display_area(&detail.area)).or_default().push(detail),
        }
    }

    let groups = known
        .into_iter()
        .map(|(area, items)| (display_area(area.as_str()), items))
        .chain(other);

    let mut html = String::new();
    for (title, items) in groups {
        html.push_str("<div class=\"area-section\">\n");
        html.push_str(&format!(
            "  <div class=\"area-title\">{}</div>\n",
            html_escape(&title)
        ));
        for detail in items {
            html.push_str("  <div class=\"answer-card\">\n");
            html.push_str(&format!(
                "    <div class=\"question\">{}</div>\n    <div class=\"answer\">{}</div>\n",
                html_escape(&detail.question),
                html_escape(&detail.answer)
            ));
            if let Some(feedback) = &detail.ai_feedback {
                html.push_str(&format!(
                    "    <div class=\"feedback\">{}</div>\n",
                    html_escape(feedback)
                ));
            }
            html.push_str("  </div>\n");
        }
        html.push_str("</div>\n");
    }
    html
}

fn render_strategic_reading(reading: Option<&str>) -> String {
    match reading.map(str::trim).filter(|r| !r.is_empty()) {
        Some(text) => format!(
            "<div class=\"section\">\n  <div class=\"section-title\">Strategic reading</div>\n  \
             <div class=\"strategic-reading\">{}</div>\n</div>",
            html_escape(text).replace('\n', "<br>")
        ),
        None => String::new(),
    }
}

/// Renders the full report document.
pub fn render_report(
    diagnostic: &Diagnostic,
    details: &[DiagnosticDetail],
    generated_at: DateTime<Utc>,
) -> String {
    let score = diagnostic.general_score.unwrap_or(0);
    let date = diagnostic
        .realization_date
        .unwrap_or(diagnostic.created_at)
        .format("%d %B %Y")
        .to_string();

    fill_template(
        TEMPLATE,
        &[
            ("score_color", score_color(score).to_string()),
            ("score_label", score_label(score).to_string()),
            ("score", score.to_string()),
            ("date", date),
            (
                "generated_at",
                generated_at.format("%d %B %Y at %H:%M UTC").to_string(),
            ),
            (
                "analysis_period",
                diagnostic.analysis_period.label().to_string(),
            ),
            ("company_name", html_escape(&diagnostic.company_name)),
            (
                "strategic_reading_section",
                render_strategic_reading(diagnostic.strategic_reading.as_deref()),
            ),
            ("areas_html", render_areas(details)),
        ],
    )
}

/// Replaces `{{name}}` placeholders in one pass. Substituted values are copied
/// as they are, so placeholders inside them stay literal. Unknown names are kept.
fn fill_template(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            rest = &rest[open..];
            break;
        };
        let name = &after[..close];
        match values.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + close + 4]),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}
