use refinery_provider::{LlmProvider, ProviderError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::ide::{GeneratedPrompts, IdeKind, IdePrompts, PromptInput};
use crate::model::Analysis;
use crate::telemetry::{log_prompt_usage, PromptSettings, PromptUsage};

/// Turns an analysis into ready-to-paste prompts for coding assistants
pub struct PromptService {
    provider: Arc<dyn LlmProvider>,
    prompt_settings: PromptSettings,
}

impl PromptService {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            prompt_settings: PromptSettings::default(),
        }
    }

    pub fn with_prompt_settings(mut self, settings: PromptSettings) -> Self {
        self.prompt_settings = settings;
        self
    }

    /// One prompt per supported assistant, generated concurrently.
    ///
    /// Fails as a whole if any single prompt fails.
    pub async fn generate_ide_prompts(
        &self,
        input: &PromptInput,
    ) -> Result<GeneratedPrompts, ProviderError> {
        let (cursor, copilot, warp, windsurf) = tokio::try_join!(
            self.generate_ide_prompt(IdeKind::Cursor, input),
            self.generate_ide_prompt(IdeKind::Copilot, input),
            self.generate_ide_prompt(IdeKind::Warp, input),
            self.generate_ide_prompt(IdeKind::Windsurf, input),
        )?;

        Ok(GeneratedPrompts {
            cursor,
            copilot,
            warp,
            windsurf,
        })
    }

    pub async fn generate_ide_prompt(
        &self,
        ide: IdeKind,
        input: &PromptInput,
    ) -> Result<String, ProviderError> {
        let prompt = IdePrompts::build_ide_prompt(ide, input);
        self.text_call(&format!("ide_prompt_{}", ide), &prompt).await
    }

    /// Prompt for an assistant that has no dedicated template
    pub async fn generate_custom_prompt(
        &self,
        ide_name: &str,
        input: &PromptInput,
    ) -> Result<String, ProviderError> {
        let prompt = IdePrompts::build_custom_prompt(ide_name, input);
        self.text_call("custom_prompt", &prompt).await
    }

    /// Rewrite a prompt following the user's instructions. The requirement and
    /// analysis are only used when both are given.
    pub async fn improve_prompt(
        &self,
        original: &str,
        ide: IdeKind,
        instructions: &str,
        context: Option<(&str, &Analysis)>,
    ) -> Result<String, ProviderError> {
        let prompt = IdePrompts::build_improve_prompt(original, ide, instructions, context);
        self.text_call("improve_prompt", &prompt).await
    }

    async fn text_call(&self, template: &str, prompt: &str) -> Result<String, ProviderError> {
        debug!(template, "Generating prompt");
        let start = Instant::now();
        let reply = self
            .provider
            .generate_response(prompt)
            .await
            .inspect_err(|e| warn!(template, code = e.code(), error = %e, "Prompt call failed"))?;

        let reply = reply.trim().to_string();
        log_prompt_usage(&PromptUsage {
            template,
            version: &self.prompt_settings.version,
            mode: self.prompt_settings.mode,
            input_chars: prompt.len(),
            output_chars: reply.len(),
            latency_ms: start.elapsed().as_millis(),
            parse_ok: !reply.is_empty(),
        });

        if reply.is_empty() {
            return Err(ProviderError::EmptyResponse(self.provider.kind()));
        }
        Ok(reply)
    }
}
