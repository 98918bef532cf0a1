use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::structured;

/// Errors that can occur while talking to an LLM provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Invalid API key or unauthorized access.")]
    Unauthorized,

    #[error("API access forbidden. Check your permissions.")]
    Forbidden,

    #[error("Insufficient quota: {0}")]
    QuotaExceeded(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response from {0}")]
    EmptyResponse(ProviderKind),

    #[error("Failed to parse structured response: {0}")]
    Parse(String),

    #[error("Provider configuration error: {0}")]
    Config(String),

    #[error("Provider request failed: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Stable machine-readable code, used by the API layer and telemetry.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::RateLimited => "RATE_LIMIT",
            ProviderError::Unauthorized => "UNAUTHORIZED",
            ProviderError::Forbidden => "FORBIDDEN",
            ProviderError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            ProviderError::Network(_) => "NETWORK_ERROR",
            ProviderError::EmptyResponse(_) => "EMPTY_RESPONSE",
            ProviderError::Parse(_) => "PARSE_ERROR",
            ProviderError::Config(_) => "CONFIG_ERROR",
            ProviderError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Map a non-success HTTP status to the provider error taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 if body.contains("insufficient_quota") => {
                ProviderError::QuotaExceeded(truncate(body, 200))
            }
            429 => ProviderError::RateLimited,
            401 => ProviderError::Unauthorized,
            403 => ProviderError::Forbidden,
            _ => ProviderError::Unknown(format!("HTTP {}: {}", status, truncate(body, 200))),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            ProviderError::Network(e.to_string())
        } else if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else {
            ProviderError::Unknown(e.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
}

impl ProviderKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Google Gemini",
            ProviderKind::OpenAi => "OpenAI",
        }
    }

    /// Environment variable consulted when no API key is configured
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::OpenAi => "gpt-4o-mini",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" | "open-ai" | "gpt" => Ok(ProviderKind::OpenAi),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Configuration for a provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Falls back to the kind's API key environment variable
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(ProviderKind::default())
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: kind.default_base_url().to_string(),
            model: kind.default_model().to_string(),
            temperature: 0.7,
            top_p: 0.8,
            max_output_tokens: 8192,
            timeout: Duration::from_secs(90),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the API key from config or environment
    pub fn resolve_api_key(&self) -> Result<String, ProviderError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(self.kind.api_key_env()).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::Config(format!(
                    "{} API key not set. Set {} or configure api_key.",
                    self.kind.display_name(),
                    self.kind.api_key_env()
                ))
            })
    }
}

/// Capability interface shared by every LLM backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name of the provider
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Generate a free-text completion for the prompt
    async fn generate_response(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Generate a JSON completion, optionally constrained by a schema description
    async fn generate_structured_response(
        &self,
        prompt: &str,
        schema: Option<&str>,
    ) -> Result<serde_json::Value, ProviderError> {
        let structured_prompt = structured::structured_prompt(prompt, schema);
        let response = self.generate_response(&structured_prompt).await?;
        structured::parse_json_response(&response)
    }
}
