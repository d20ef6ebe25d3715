//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which generative-AI backend produces the diagnostic reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiProvider {
    /// Google Gemini `generateContent` API, key sent in `x-goog-api-key`.
    Gemini,
    /// Any OpenAI-compatible chat completions API.
    OpenAi,
}

impl FromStr for AiProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("'{}' is not a supported AI provider", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub ai_provider: AiProvider,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub ai_temperature: f32,
    pub ai_timeout_secs: u64,
    pub pdf_renderer_url: Option<String>,
    pub session_ttl_days: i64,
    pub cookie_secure: bool,
    pub cors_origin: String,
}

impl Default for Config {
    /// Development defaults; `DATABASE_URL` is left empty.
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: String::new(),
            log_level: Level::INFO,
            ai_provider: AiProvider::Gemini,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: None,
            ai_temperature: 0.7,
            ai_timeout_secs: 120,
            pdf_renderer_url: None,
            session_ttl_days: 7,
            cookie_secure: false,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// Reads an optional variable and parses it, keeping `default` when unset.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        _ => Ok(default),
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        // --- Load Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", defaults.bind_address)?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load AI Settings ---
        let ai_provider = parse_var("AI_PROVIDER", defaults.ai_provider)?;
        let gemini_api_key = optional_var("GEMINI_API_KEY");
        let openai_api_key = optional_var("OPENAI_API_KEY");
        match ai_provider {
            AiProvider::Gemini if gemini_api_key.is_none() => {
                return Err(ConfigError::MissingVar("GEMINI_API_KEY".to_string()))
            }
            AiProvider::OpenAi if openai_api_key.is_none() => {
                return Err(ConfigError::MissingVar("OPENAI_API_KEY".to_string()))
            }
            _ => {}
        }

        let ai_temperature: f32 = parse_var("AI_TEMPERATURE", defaults.ai_temperature)?;
        if !(0.0..=2.0).contains(&ai_temperature) {
            return Err(ConfigError::InvalidValue(
                "AI_TEMPERATURE".to_string(),
                format!("{} is outside 0.0..=2.0", ai_temperature),
            ));
        }

        let session_ttl_days: i64 = parse_var("SESSION_TTL_DAYS", defaults.session_ttl_days)?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            ai_provider,
            gemini_api_key,
            gemini_model: optional_var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: optional_var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            openai_api_key,
            openai_model: optional_var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_base_url: optional_var("OPENAI_BASE_URL"),
            ai_temperature,
            ai_timeout_secs: parse_var("AI_TIMEOUT_SECS", defaults.ai_timeout_secs)?,
            pdf_renderer_url: optional_var("PDF_RENDERER_URL"),
            session_ttl_days,
            cookie_secure: parse_var("COOKIE_SECURE", defaults.cookie_secure)?,
            cors_origin: optional_var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
        })
    }
}
