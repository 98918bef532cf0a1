//! # refinery-provider
//!
//! LLM provider abstraction for refinery.
//!
//! Every backend implements [`LlmProvider`], which exposes a free-text call
//! and a structured (JSON) call. The concrete backend is selected from
//! configuration with [`create_provider`].

mod gemini;
mod openai;
pub mod structured;
mod traits;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use traits::{LlmProvider, ProviderConfig, ProviderError, ProviderKind};

/// Create a provider from its configuration
pub fn create_provider(config: ProviderConfig) -> Result<Box<dyn LlmProvider>, ProviderError> {
    match config.kind {
        ProviderKind::Gemini => Ok(Box::new(GeminiProvider::new(config)?)),
        ProviderKind::OpenAi => Ok(Box::new(OpenAiProvider::new(config)?)),
    }
}
