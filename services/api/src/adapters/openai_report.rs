//! services/api/src/adapters/openai_report.rs
//!
//! Report generation through any OpenAI-compatible chat completions endpoint.
//! It implements the `ReportGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use diagnostic_core::ports::{PortError, PortResult, ReportGenerationService};

const SYSTEM_INSTRUCTIONS: &str = "You are a business diagnostic engine. \
Always answer with a single valid JSON object and nothing else.";

/// An adapter that implements `ReportGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiReportAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiReportAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String, temperature: f32) -> Self {
        Self {
            client,
            model,
            temperature,
        }
    }
}

fn upstream(e: OpenAIError) -> PortError {
    match e {
        OpenAIError::ApiError(api) => PortError::Upstream(api.message),
        other => PortError::Upstream(other.to_string()),
    }
}

#[async_trait]
impl ReportGenerationService for OpenAiReportAdapter {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn generate_report_text(&self, prompt: &str) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .response_format(ResponseFormat::JsonObject)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(upstream)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                PortError::InvalidResponse("The model returned no text content.".to_string())
            })
    }
}
