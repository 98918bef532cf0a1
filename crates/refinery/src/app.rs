use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use refinery_analysis::{
    Analysis, AnalysisService, PromptService, RefineError, RefinementRequest, Refiner,
};
use refinery_core::IterationEngine;
use refinery_logging::{LogFormat, Logger};
use refinery_provider::{create_provider, LlmProvider, ProviderError};
use refinery_store::SqliteStore;

use crate::config::ProjectConfig;

/// Provider and model chosen on the command line
#[derive(Debug, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// LLM-backed services sharing one provider
#[derive(Clone)]
struct Services {
    analysis: Arc<AnalysisService>,
    prompts: Arc<PromptService>,
}

/// Engine plus, when a provider is configured, the services behind it
pub struct App {
    pub engine: Arc<IterationEngine>,
    services: Result<Services, String>,
}

/// Stands in for the service when no provider could be built, so offline
/// commands still work against the stored history
struct UnavailableRefiner {
    reason: String,
}

#[async_trait]
impl Refiner for UnavailableRefiner {
    async fn refine(&self, request: &RefinementRequest) -> Result<Analysis, RefineError> {
        Err(RefineError::new(
            request.iteration_number,
            ProviderError::Config(self.reason.clone()),
        ))
    }
}

impl App {
    pub fn open(
        config: &ProjectConfig,
        overrides: &Overrides,
        log_format: LogFormat,
        working_dir: &Path,
    ) -> Result<Self> {
        let provider_config =
            config.provider_config(overrides.provider.as_deref(), overrides.model.as_deref())?;
        let services = match create_provider(provider_config) {
            Ok(provider) => {
                let provider: Arc<dyn LlmProvider> = Arc::from(provider);
                let settings = config.prompt_settings();
                Ok(Services {
                    analysis: Arc::new(
                        AnalysisService::new(provider.clone())
                            .with_prompt_settings(settings.clone()),
                    ),
                    prompts: Arc::new(
                        PromptService::new(provider).with_prompt_settings(settings),
                    ),
                })
            }
            Err(e) => {
                debug!(error = %e, "LLM provider unavailable");
                Err(e.to_string())
            }
        };

        let refiner: Arc<dyn Refiner> = match services {
            Ok(ref services) => services.analysis.clone(),
            Err(ref reason) => Arc::new(UnavailableRefiner {
                reason: reason.clone(),
            }),
        };

        let store = match config.database_path(working_dir) {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                SqliteStore::open_at(&path)
                    .with_context(|| format!("Failed to open {}", path.display()))?
            }
            None => SqliteStore::open().context("Failed to open history database")?,
        };

        let logger = match config.engine.events_file {
            Some(ref path) => Logger::with_file(log_format, &working_dir.join(path))
                .with_context(|| format!("Failed to open {}", path.display()))?,
            None => Logger::new(log_format),
        };

        let engine = IterationEngine::new(refiner, Arc::new(store))
            .with_timeout(config.refine_timeout())
            .with_logger(Arc::new(logger));

        Ok(Self {
            engine: Arc::new(engine),
            services,
        })
    }

    fn services(&self) -> Result<&Services> {
        self.services
            .as_ref()
            .map_err(|reason| anyhow::anyhow!("LLM provider unavailable: {}", reason))
    }

    /// The analysis service, or why no provider is available
    pub fn service(&self) -> Result<Arc<AnalysisService>> {
        Ok(self.services()?.analysis.clone())
    }

    pub fn prompt_service(&self) -> Result<Arc<PromptService>> {
        Ok(self.services()?.prompts.clone())
    }
}
