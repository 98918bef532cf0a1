//! Project configuration file support for refinery.
//!
//! Loads configuration from `refinery.toml` in the working directory.

use anyhow::{Context, Result};
use refinery_analysis::{PromptMode, PromptSettings};
use refinery_core::DEFAULT_REFINE_TIMEOUT;
use refinery_provider::{ProviderConfig, ProviderKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-level configuration loaded from `refinery.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub prompt: PromptSection,
}

/// `[provider]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    /// `gemini` or `openai`
    pub name: Option<String>,
    pub model: Option<String>,
    /// Overridden by `GEMINI_API_KEY` / `OPENAI_API_KEY`
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// `[engine]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// SQLite file holding the iteration history
    pub database: Option<PathBuf>,
    /// Upper bound on one refinement; `0` disables it
    pub refine_timeout_secs: Option<u64>,
    /// JSON diagnostics file
    pub log_file: Option<PathBuf>,
    /// JSONL file receiving every engine event
    pub events_file: Option<PathBuf>,
}

/// `[server]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub rate_limit_requests: Option<usize>,
    pub rate_limit_window_secs: Option<u64>,
}

/// `[prompt]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PromptSection {
    pub version: Option<String>,
    pub mode: Option<String>,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "refinery.toml";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_RATE_LIMIT_REQUESTS: usize = 10;
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }

    /// Build the provider configuration.
    /// Priority: CLI flag > `[provider]` table > provider default
    pub fn provider_config(
        &self,
        cli_provider: Option<&str>,
        cli_model: Option<&str>,
    ) -> Result<ProviderConfig> {
        let kind: ProviderKind = match cli_provider.or(self.provider.name.as_deref()) {
            Some(name) => name.parse().map_err(anyhow::Error::msg)?,
            None => ProviderKind::default(),
        };

        let section = &self.provider;
        let mut config = ProviderConfig::new(kind);
        if let Some(model) = cli_model.or(section.model.as_deref()) {
            config = config.with_model(model);
        }
        if let Some(ref url) = section.base_url {
            config = config.with_base_url(url.as_str());
        }
        if let Some(secs) = section.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(t) = section.temperature {
            config.temperature = t;
        }
        if let Some(p) = section.top_p {
            config.top_p = p;
        }
        if let Some(max) = section.max_output_tokens {
            config.max_output_tokens = max;
        }

        let env_key = std::env::var(kind.api_key_env())
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Some(key) = env_key.or_else(|| section.api_key.clone()) {
            config = config.with_api_key(key);
        }

        Ok(config)
    }

    /// Prompt version and mode.
    /// Priority: `PROMPT_VERSION` / `PROMPT_MODE` > `[prompt]` table > defaults
    pub fn prompt_settings(&self) -> PromptSettings {
        let mut settings = PromptSettings::default();
        if let Some(ref version) = self.prompt.version {
            settings.version = version.clone();
        }
        if let Some(mode) = self
            .prompt
            .mode
            .as_deref()
            .and_then(|m| m.parse::<PromptMode>().ok())
        {
            settings.mode = mode;
        }

        let env = PromptSettings::from_env();
        if std::env::var("PROMPT_VERSION").is_ok_and(|v| !v.trim().is_empty()) {
            settings.version = env.version;
        }
        if std::env::var("PROMPT_MODE").is_ok_and(|m| m.parse::<PromptMode>().is_ok()) {
            settings.mode = env.mode;
        }
        settings
    }

    pub fn refine_timeout(&self) -> Option<Duration> {
        match self.engine.refine_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_REFINE_TIMEOUT),
        }
    }

    /// Relative paths resolve against the working directory
    pub fn database_path(&self, working_dir: &Path) -> Option<PathBuf> {
        self.engine.database.as_ref().map(|p| working_dir.join(p))
    }

    pub fn port(&self) -> u16 {
        self.server.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn rate_limit(&self) -> (usize, Duration) {
        (
            self.server
                .rate_limit_requests
                .unwrap_or(DEFAULT_RATE_LIMIT_REQUESTS),
            self.server
                .rate_limit_window_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) {
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[provider]
name = "openai"
model = "gpt-4o"
temperature = 0.2

[engine]
database = "history.db"
refine_timeout_secs = 30

[server]
port = 8080
rate_limit_requests = 5

[prompt]
version = "v7"
mode = "exp"
"#,
        );

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        let provider = config.provider_config(None, None).unwrap();
        assert_eq!(provider.kind, ProviderKind::OpenAi);
        assert_eq!(provider.model, "gpt-4o");
        assert_eq!(provider.temperature, 0.2);
        assert_eq!(provider.top_p, 0.8);

        assert_eq!(config.refine_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.database_path(dir.path()),
            Some(dir.path().join("history.db"))
        );
        assert_eq!(config.port(), 8080);
        assert_eq!(config.rate_limit(), (5, DEFAULT_RATE_LIMIT_WINDOW));
    }

    #[test]
    fn test_cli_overrides_file() {
        let config: ProjectConfig = toml::from_str(
            r#"
[provider]
name = "openai"
model = "gpt-4o"
"#,
        )
        .unwrap();

        let provider = config
            .provider_config(Some("gemini"), Some("gemini-1.5-pro"))
            .unwrap();
        assert_eq!(provider.kind, ProviderKind::Gemini);
        assert_eq!(provider.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::default();
        let provider = config.provider_config(None, None).unwrap();
        assert_eq!(provider.kind, ProviderKind::Gemini);
        assert_eq!(provider.model, "gemini-1.5-flash");
        assert_eq!(config.refine_timeout(), Some(DEFAULT_REFINE_TIMEOUT));
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(
            config.rate_limit(),
            (DEFAULT_RATE_LIMIT_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW)
        );
        assert!(config.database_path(Path::new("/tmp")).is_none());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config: ProjectConfig = toml::from_str("[engine]\nrefine_timeout_secs = 0\n").unwrap();
        assert_eq!(config.refine_timeout(), None);
    }

    #[test]
    fn test_unknown_provider_is_error() {
        let config = ProjectConfig::default();
        assert!(config.provider_config(Some("llama"), None).is_err());
    }

    #[test]
    fn test_unknown_field_is_hard_error() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[provider]\nflavor = \"spicy\"\n");
        assert!(ProjectConfig::load(dir.path()).is_err());
    }
}
