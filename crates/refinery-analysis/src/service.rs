use async_trait::async_trait;
use refinery_provider::{LlmProvider, ProviderError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::form::RequirementForm;
use crate::ingest::{ingest_questions, IdScheme, RawAnalysis, RawQuestions};
use crate::model::{Analysis, AnalysisEdits, Question};
use crate::prompts::{AnalysisPrompts, IterationPromptInput, CONTEXT_SUMMARY_THRESHOLD};
use crate::telemetry::{log_prompt_usage, PromptSettings, PromptUsage};

/// Everything a refinement call needs, captured when the call is issued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementRequest {
    pub requirement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<RequirementForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,
    pub previous_analysis: Analysis,
    /// Number of the iteration the refinement starts from, which need not be the latest
    pub previous_iteration_number: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_edits: Option<AnalysisEdits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
    pub iteration_number: usize,
}

#[derive(Error, Debug)]
#[error("Iteration {iteration} failed: {source}")]
pub struct RefineError {
    pub iteration: usize,
    #[source]
    pub source: ProviderError,
}

impl RefineError {
    pub fn new(iteration: usize, source: ProviderError) -> Self {
        Self { iteration, source }
    }

    pub fn code(&self) -> &'static str {
        self.source.code()
    }
}

/// Produces the next analysis from the previous one plus user input.
///
/// Calls are not idempotent: identical requests may yield different analyses.
#[async_trait]
pub trait Refiner: Send + Sync {
    async fn refine(&self, request: &RefinementRequest) -> Result<Analysis, RefineError>;
}

/// LLM-backed analysis service
pub struct AnalysisService {
    provider: Arc<dyn LlmProvider>,
    prompt_settings: PromptSettings,
}

impl AnalysisService {
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

    /// First, non-iterative analysis of a requirement
    pub async fn analyze_requirement(
        &self,
        requirement: &str,
        context: &str,
        form: Option<&RequirementForm>,
    ) -> Result<Analysis, ProviderError> {
        let requirement = structured(requirement, form);
        let context = self.summarize_context(context).await;
        let prompt = AnalysisPrompts::build_analysis_prompt(&requirement, &context);

        let raw: RawAnalysis = self.structured_call("analysis", &prompt).await?;
        Ok(raw.into_analysis(IdScheme::Initial))
    }

    /// Condense oversized context; falls back to the raw text on failure
    pub async fn summarize_context(&self, context: &str) -> String {
        if context.chars().count() <= CONTEXT_SUMMARY_THRESHOLD {
            return context.to_string();
        }

        debug!(context_len = context.len(), "Summarizing oversized context");
        let prompt = AnalysisPrompts::build_summarization_prompt(context);
        match self.provider.generate_response(&prompt).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Context summarization failed, using raw context");
                context.to_string()
            }
        }
    }

    /// Ask for follow-up questions. Failures degrade to no questions.
    pub async fn generate_additional_questions(
        &self,
        requirement: &str,
        current: &Analysis,
        answered: &[Question],
    ) -> Vec<Question> {
        let prompt =
            AnalysisPrompts::build_additional_questions_prompt(requirement, current, answered);

        match self
            .structured_call::<RawQuestions>("additional_questions", &prompt)
            .await
        {
            Ok(raw) => ingest_questions(
                raw.questions,
                IdScheme::Additional(chrono::Utc::now().timestamp_millis()),
            ),
            Err(e) => {
                warn!(error = %e, "Failed to generate additional questions");
                Vec::new()
            }
        }
    }

    async fn structured_call<T: serde::de::DeserializeOwned>(
        &self,
        template: &str,
        prompt: &str,
    ) -> Result<T, ProviderError> {
        let start = Instant::now();
        let value = self
            .provider
            .generate_structured_response(prompt, None)
            .await
            .inspect_err(|e| warn!(template, code = e.code(), error = %e, "Structured call failed"))?;

        let output_chars = value.to_string().len();
        let parsed = serde_json::from_value::<T>(value);

        log_prompt_usage(&PromptUsage {
            template,
            version: &self.prompt_settings.version,
            mode: self.prompt_settings.mode,
            input_chars: prompt.len(),
            output_chars,
            latency_ms: start.elapsed().as_millis(),
            parse_ok: parsed.is_ok(),
        });

        parsed.map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Refiner for AnalysisService {
    async fn refine(&self, request: &RefinementRequest) -> Result<Analysis, RefineError> {
        let iteration = request.iteration_number;
        let requirement = structured(&request.requirement, request.form.as_ref());
        let context = self
            .summarize_context(request.context_summary.as_deref().unwrap_or_default())
            .await;

        let prompt = AnalysisPrompts::build_iteration_prompt(&IterationPromptInput {
            requirement: &requirement,
            context: &context,
            previous: &request.previous_analysis,
            previous_number: request.previous_iteration_number,
            iteration_number: iteration,
            user_edits: request.user_edits.as_ref(),
            user_feedback: request.user_feedback.as_deref(),
        });

        let template = format!("analysis_iteration_{}", iteration);
        let raw: RawAnalysis = self
            .structured_call(&template, &prompt)
            .await
            .map_err(|e| RefineError::new(iteration, e))?;

        Ok(raw.into_analysis(IdScheme::Iteration(iteration)))
    }
}

fn structured(requirement: &str, form: Option<&RequirementForm>) -> String {
    match form {
        Some(form) => form.structured_requirement(requirement),
        None => requirement.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinery_provider::ProviderKind;
    use std::sync::Mutex;

    /// Replays canned replies and records the prompts it saw
    struct ScriptedProvider {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Gemini
        }

        fn model(&self) -> &str {
            "test"
        }

        async fn generate_response(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ProviderError::Unknown("no scripted reply".into()));
            }
            replies.remove(0)
        }
    }

    fn request(iteration_number: usize) -> RefinementRequest {
        RefinementRequest {
            requirement: "Build a login page".into(),
            form: None,
            context_summary: None,
            previous_analysis: Analysis {
                goals: vec!["Login".into()],
                ..Default::default()
            },
            previous_iteration_number: iteration_number - 1,
            user_edits: None,
            user_feedback: Some("Add MFA".into()),
            iteration_number,
        }
    }

    #[tokio::test]
    async fn test_refine_ingests_reply_with_iteration_ids() {
        let provider = ScriptedProvider::new(vec![Ok(r#"{
            "goals": ["Login", "MFA"],
            "questions": [{"text": "Which factor?", "priority": "critical"}],
            "assumptions": [{"text": "TOTP", "confidence": 3}]
        }"#
        .into())]);
        let service = AnalysisService::new(provider.clone());

        let analysis = service.refine(&request(2)).await.unwrap();

        assert_eq!(analysis.goals, vec!["Login", "MFA"]);
        assert_eq!(analysis.questions[0].id, "iter2_q1");
        assert_eq!(analysis.assumptions[0].id, "iter2_a1");
        assert_eq!(analysis.assumptions[0].confidence, 1.0);

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("ITERATION 2"));
        assert!(prompts[0].contains("USER FEEDBACK:\nAdd MFA"));
    }

    #[tokio::test]
    async fn test_refine_labels_selected_source_iteration() {
        let provider = ScriptedProvider::new(vec![Ok(r#"{"goals": ["Login"]}"#.into())]);
        let service = AnalysisService::new(provider.clone());
        let mut request = request(4);
        request.previous_iteration_number = 1;

        service.refine(&request).await.unwrap();

        let prompts = provider.prompts();
        assert!(prompts[0].contains("ITERATION 4"));
        assert!(prompts[0].contains("PREVIOUS ANALYSIS (Iteration 1)"));
    }

    #[tokio::test]
    async fn test_refine_preserves_failure_kind() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::RateLimited)]);
        let service = AnalysisService::new(provider);

        let err = service.refine(&request(4)).await.unwrap_err();

        assert_eq!(err.iteration, 4);
        assert_eq!(err.code(), "RATE_LIMIT");
        assert!(err.to_string().starts_with("Iteration 4 failed"));
    }

    #[tokio::test]
    async fn test_refine_reports_parse_errors() {
        let provider = ScriptedProvider::new(vec![Ok("not json at all".into())]);
        let service = AnalysisService::new(provider);

        let err = service.refine(&request(2)).await.unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_large_context_is_summarized_first() {
        let provider = ScriptedProvider::new(vec![
            Ok("short summary".into()),
            Ok(r#"{"goals": ["g"]}"#.into()),
        ]);
        let service = AnalysisService::new(provider.clone());
        let context = "x".repeat(CONTEXT_SUMMARY_THRESHOLD + 1);

        let analysis = service
            .analyze_requirement("Build search", &context, None)
            .await
            .unwrap();

        assert_eq!(analysis.goals, vec!["g"]);
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Summarize the following"));
        assert!(prompts[1].contains("short summary"));
    }

    #[tokio::test]
    async fn test_failed_summary_falls_back_to_raw_context() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Network("down".into()))]);
        let service = AnalysisService::new(provider);
        let context = "y".repeat(CONTEXT_SUMMARY_THRESHOLD + 10);

        assert_eq!(service.summarize_context(&context).await, context);
    }

    #[tokio::test]
    async fn test_additional_questions_degrade_to_empty() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Unauthorized)]);
        let service = AnalysisService::new(provider);

        let questions = service
            .generate_additional_questions("req", &Analysis::default(), &[])
            .await;
        assert!(questions.is_empty());
    }

    #[tokio::test]
    async fn test_additional_questions_get_fresh_ids() {
        let provider = ScriptedProvider::new(vec![Ok(
            r#"{"questions": [{"text": "Mobile too?"}, {"text": "Rate limits?"}]}"#.into(),
        )]);
        let service = AnalysisService::new(provider);

        let questions = service
            .generate_additional_questions("req", &Analysis::default(), &[])
            .await;
        assert_eq!(questions.len(), 2);
        assert!(questions[0].id.starts_with("new_q"));
        assert!(questions[1].id.ends_with("_1"));
    }
}
