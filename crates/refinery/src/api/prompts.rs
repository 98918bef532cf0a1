//! # Prompt API
//!
//! - `POST /api/prompts` - Generate and store one prompt per coding assistant
//! - `GET /api/prompts` - Stored prompts and edits
//! - `PUT /api/prompts/edited` - Replace one assistant's prompt
//! - `POST /api/prompts/improve` - Rewrite a prompt following user instructions

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use refinery_analysis::{
    Analysis, Assumption, EditedPrompts, GeneratedPrompts, IdeKind, PromptInput, Question,
    RequirementForm,
};
use refinery_core::IterationEngine;

use super::{ApiError, AppState};
use crate::validation::{validate_analysis_input, validate_improve_input};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePromptsRequest {
    pub requirement: String,
    #[serde(default)]
    pub form_data: Option<RequirementForm>,
    pub analysis: Analysis,
    /// Defaults to the analysis' own questions
    #[serde(default)]
    pub answered_questions: Option<Vec<Question>>,
    /// Defaults to the analysis' own assumptions
    #[serde(default)]
    pub accepted_assumptions: Option<Vec<Assumption>>,
}

#[derive(Serialize)]
pub struct GeneratePromptsResponse {
    pub success: bool,
    pub data: GeneratedPrompts,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPromptsResponse {
    pub prompts: Option<GeneratedPrompts>,
    pub edited_prompts: EditedPrompts,
}

impl StoredPromptsResponse {
    fn from_engine(engine: &IterationEngine) -> Self {
        let stored = engine.prompts();
        Self {
            prompts: stored.generated,
            edited_prompts: stored.edited,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPromptRequest {
    pub ide_type: IdeKind,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovePromptRequest {
    pub original_prompt: String,
    pub ide_type: IdeKind,
    pub improvement_instructions: String,
    #[serde(default)]
    pub requirement: Option<String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovedPrompt {
    pub improved_prompt: String,
    pub original_prompt: String,
    pub ide_type: IdeKind,
    pub improvement_instructions: String,
}

#[derive(Serialize)]
pub struct ImprovePromptResponse {
    pub success: bool,
    pub data: ImprovedPrompt,
}

pub async fn generate_prompts(
    State(state): State<AppState>,
    payload: Result<Json<GeneratePromptsRequest>, JsonRejection>,
) -> Result<Json<GeneratePromptsResponse>, ApiError> {
    if !state.limiter.try_acquire() {
        return Err(ApiError::RateLimited);
    }

    let Json(request) = payload?;
    let problems = validate_analysis_input(&request.requirement, None);
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let mut input = PromptInput::from_analysis(request.requirement, request.analysis)
        .with_form(request.form_data.as_ref());
    if let Some(questions) = request.answered_questions {
        input.answered_questions = questions;
    }
    if let Some(assumptions) = request.accepted_assumptions {
        input.accepted_assumptions = assumptions;
    }

    let prompts = state
        .prompts
        .generate_ide_prompts(&input)
        .await
        .map_err(ApiError::Provider)?;
    state.engine.set_generated_prompts(prompts.clone());

    Ok(Json(GeneratePromptsResponse {
        success: true,
        data: prompts,
    }))
}

pub async fn get_prompts(State(state): State<AppState>) -> Json<StoredPromptsResponse> {
    Json(StoredPromptsResponse::from_engine(&state.engine))
}

pub async fn edit_prompt(
    State(state): State<AppState>,
    payload: Result<Json<EditPromptRequest>, JsonRejection>,
) -> Result<Json<StoredPromptsResponse>, ApiError> {
    let Json(request) = payload?;
    state.engine.set_edited_prompt(request.ide_type, request.prompt);
    Ok(Json(StoredPromptsResponse::from_engine(&state.engine)))
}

pub async fn improve_prompt(
    State(state): State<AppState>,
    payload: Result<Json<ImprovePromptRequest>, JsonRejection>,
) -> Result<Json<ImprovePromptResponse>, ApiError> {
    if !state.limiter.try_acquire() {
        return Err(ApiError::RateLimited);
    }

    let Json(request) = payload?;
    let problems =
        validate_improve_input(&request.original_prompt, &request.improvement_instructions);
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let context = request.requirement.as_deref().zip(request.analysis.as_ref());
    let improved = state
        .prompts
        .improve_prompt(
            &request.original_prompt,
            request.ide_type,
            &request.improvement_instructions,
            context,
        )
        .await
        .map_err(ApiError::Provider)?;

    Ok(Json(ImprovePromptResponse {
        success: true,
        data: ImprovedPrompt {
            improved_prompt: improved,
            original_prompt: request.original_prompt,
            ide_type: request.ide_type,
            improvement_instructions: request.improvement_instructions,
        },
    }))
}