//! services/api/src/adapters/gemini.rs
//!
//! Report generation through the Google Gemini `generateContent` REST API.

use async_trait::async_trait;
use diagnostic_core::ports::{PortError, PortResult, ReportGenerationService};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct GeminiReportAdapter {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    client: Client,
}

impl GeminiReportAdapter {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        temperature: f32,
        timeout_secs: u64,
    ) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Pulls the provider's own message out of an error body, falling back to the raw text.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("Gemini API error {}: {}", status, body))
}

#[async_trait]
impl ReportGenerationService for GeminiReportAdapter {
    fn provider(&self) -> &str {
        "gemini"
    }

    async fn generate_report_text(&self, prompt: &str) -> PortResult<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json",
            },
        };

        tracing::debug!(model = %self.model, prompt_length = prompt.len(), "Calling Gemini API");

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Failed to reach Gemini API: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PortError::Upstream(format!("Failed to read Gemini response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(%status, body = %body, "Gemini API request failed");
            return Err(PortError::Upstream(error_message(status, &body)));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| PortError::InvalidResponse(format!("Malformed Gemini response: {}", e)))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| PortError::InvalidResponse("Gemini returned no text content.".to_string()))
    }
}
