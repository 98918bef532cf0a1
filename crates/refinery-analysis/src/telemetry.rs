use serde::{Deserialize, Serialize};
use tracing::info;

/// Release channel of the prompt templates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[default]
    Stable,
    Exp,
}

impl std::fmt::Display for PromptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptMode::Stable => write!(f, "stable"),
            PromptMode::Exp => write!(f, "exp"),
        }
    }
}

impl std::str::FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stable" => Ok(PromptMode::Stable),
            "exp" | "experimental" => Ok(PromptMode::Exp),
            _ => Err(format!("Unknown prompt mode: {}", s)),
        }
    }
}

/// Version tag attached to every prompt usage record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSettings {
    pub version: String,
    pub mode: PromptMode,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            version: chrono::Utc::now().format("%Y-%m-%d").to_string(),
            mode: PromptMode::default(),
        }
    }
}

impl PromptSettings {
    /// Read `PROMPT_VERSION` / `PROMPT_MODE`, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            version: std::env::var("PROMPT_VERSION")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.version),
            mode: std::env::var("PROMPT_MODE")
                .ok()
                .and_then(|m| m.parse().ok())
                .unwrap_or(defaults.mode),
        }
    }
}

/// One structured model call, for telemetry
#[derive(Debug, Clone, Serialize)]
pub struct PromptUsage<'a> {
    pub template: &'a str,
    pub version: &'a str,
    pub mode: PromptMode,
    pub input_chars: usize,
    pub output_chars: usize,
    pub latency_ms: u128,
    pub parse_ok: bool,
}

pub fn log_prompt_usage(usage: &PromptUsage<'_>) {
    info!(
        target: "refinery::telemetry",
        template = usage.template,
        version = usage.version,
        mode = %usage.mode,
        input_chars = usage.input_chars,
        output_chars = usage.output_chars,
        latency_ms = usage.latency_ms as u64,
        parse_ok = usage.parse_ok,
        "prompt_usage"
    );
}
