//! crates/diagnostic_core/src/report.rs
//!
//! The report produced by the model: the prompt that asks for it and the parser
//! that turns the model's reply back into a `DiagnosticReport`.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::domain::{Area, Diagnostic, DiagnosticDetail};

//=========================================================================================
// Report Structure
//=========================================================================================

/// A validated report. The model's JSON is kept as returned, including any
/// fields beyond the ones read here.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    pub general_score: f64,
    pub strategic_reading: String,
    /// Scores from `charts_data.areas`, skipping entries without a usable name or score.
    pub area_scores: Vec<AreaScore>,
    raw: Value,
}

impl DiagnosticReport {
    /// The score as stored on the diagnostic: rounded into `0..=100`.
    pub fn stored_score(&self) -> i32 {
        self.general_score.round().clamp(0.0, 100.0) as i32
    }

    pub fn json(&self) -> &Value {
        &self.raw
    }

    pub fn into_json(self) -> Value {
        self.raw
    }
}

impl Serialize for DiagnosticReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaScore {
    pub name: String,
    pub score: f64,
}

/// Reads a score that may arrive as a number or as numeric text.
fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn area_scores(value: &Value) -> Vec<AreaScore> {
    value
        .pointer("/charts_data/areas")
        .and_then(Value::as_array)
        .map(|areas| {
            areas
                .iter()
                .filter_map(|area| {
                    let name = area.get("name")?.as_str()?.trim();
                    let score = loose_number(area.get("score")?)?;
                    (!name.is_empty()).then(|| AreaScore {
                        name: name.to_string(),
                        score,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

//=========================================================================================
// Prompt
//=========================================================================================

const PROMPT_HEADER: &str = "You are a consultant specialised in marketing and sales. \
Analyse the answers below and produce a complete, actionable diagnostic.";

const PROMPT_INSTRUCTIONS: &str = r#"Produce a JSON diagnostic with EXACTLY the following structure (no markdown, valid JSON only):

{
  "general_score": <number from 0 to 100>,
  "strategic_reading": "<clear, decision-oriented executive text, 2-3 paragraphs>",
  "priorities": [
    {
      "title": "<priority title>",
      "description": "<detailed description>",
      "impact": "high" | "medium" | "low"
    }
  ],
  "bottlenecks": [
    {
      "title": "<bottleneck title>",
      "description": "<description>",
      "evidence": ["<evidence 1>", "<evidence 2>"]
    }
  ],
  "charts_data": {
    "areas": [
      {
        "name": "<area name>",
        "score": <number from 0 to 100>
      }
    ],
    "revenue_impact": {
      "current": <estimated current value>,
      "potential": <potential value>,
      "gap": <difference>
    }
  },
  "lost_revenue_indicators": [
    {
      "category": "<category>",
      "estimated_loss": <amount>,
      "description": "<description>"
    }
  ]
}

IMPORTANT: Return ONLY the valid JSON, with no markdown and no additional explanation."#;

/// Renders the prompt for a diagnostic.
///
/// Answers are grouped by area in questionnaire order; within an area they keep
/// the order they were given in. Answers whose area is not one of the six
/// categories are listed after the known ones, sorted by name.
pub fn build_prompt(diagnostic: &Diagnostic, answers: &[DiagnosticDetail]) -> String {
    let mut known: BTreeMap<Area, Vec<&DiagnosticDetail>> = BTreeMap::new();
    let mut other: BTreeMap<String, Vec<&DiagnosticDetail>> = BTreeMap::new();
    for answer in answers {
        match answer.area.parse::<Area>() {
            Ok(area) => known.entry(area).or_default().push(answer),
            Err(_) => other
                .entry(answer.area.trim().to_lowercase())
                .or_default()
                .push(answer),
        }
    }

    let mut prompt = format!(
        "{PROMPT_HEADER}\n\nCOMPANY: {}\nANALYSIS PERIOD: {}\n\nANSWERS BY AREA:\n",
        diagnostic.company_name,
        diagnostic.analysis_period.label()
    );

    let sections = known
        .iter()
        .map(|(area, items)| (area.as_str().to_string(), items))
        .chain(other.iter().map(|(name, items)| (name.clone(), items)));
    for (area, items) in sections {
        prompt.push_str(&format!("\n## {}\n", area.to_uppercase()));
        for answer in items {
            prompt.push_str(&format!("- {}: {}\n", answer.question, answer.answer));
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(PROMPT_INSTRUCTIONS);
    prompt
}

//=========================================================================================
// Parsing
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("could not extract JSON from the AI response")]
    NoJson,
    #[error("invalid report structure: {0}")]
    InvalidStructure(String),
}

fn fenced_json() -> &'static Regex {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    FENCED.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*(\{[\s\S]*\})\s*```").expect("fenced JSON pattern is valid")
    })
}

/// Extracts the JSON object from the model's text: first as-is, then from a
/// fenced code block.
fn extract_json(text: &str) -> Result<Value, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }
    let captured = fenced_json()
        .captures(text)
        .and_then(|c| c.get(1))
        .ok_or(ParseError::NoJson)?;
    serde_json::from_str(captured.as_str()).map_err(|_| ParseError::NoJson)
}

/// Minimal structural checks on the raw JSON before it is typed.
fn validate(value: &Value) -> Result<(), ParseError> {
    if !value.get("general_score").is_some_and(Value::is_number) {
        return Err(ParseError::InvalidStructure(
            "general_score must be a number".into(),
        ));
    }
    let reading = value
        .get("strategic_reading")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if reading.trim().is_empty() {
        return Err(ParseError::InvalidStructure(
            "strategic_reading must be a non-empty string".into(),
        ));
    }
    if !value.get("priorities").is_some_and(Value::is_array) {
        return Err(ParseError::InvalidStructure(
            "priorities must be an array".into(),
        ));
    }
    Ok(())
}

/// Parses and validates the text returned by the model.
///
/// Only the top-level fields are checked; nested sections are passed through
/// untouched.
pub fn parse_report(text: &str) -> Result<DiagnosticReport, ParseError> {
    let value = extract_json(text)?;
    validate(&value)?;
    let general_score = value
        .get("general_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| ParseError::InvalidStructure("general_score must be a number".into()))?;
    let strategic_reading = value
        .get("strategic_reading")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(DiagnosticReport {
        general_score,
        strategic_reading,
        area_scores: area_scores(&value),
        raw: value,
    })
}
