//! # Analysis API
//!
//! Routes that call the LLM provider directly.
//!
//! - `POST /api/analyze` - Initial analysis; seeds the history when it is empty
//! - `POST /api/questions` - Follow-up questions for the current analysis

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use refinery_analysis::{Analysis, Question, RequirementForm};

use super::{ApiError, AppState};
use crate::validation::{validate_analysis_input, MIN_REQUIREMENT_CHARS};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub requirement: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub form_data: Option<RequirementForm>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub data: Analysis,
    /// Whether the analysis became iteration 1
    pub seeded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsRequest {
    pub requirement: String,
    pub current_analysis: Analysis,
    #[serde(default)]
    pub answered_questions: Vec<Question>,
}

#[derive(Serialize)]
pub struct QuestionsData {
    pub questions: Vec<Question>,
}

#[derive(Serialize)]
pub struct QuestionsResponse {
    pub success: bool,
    pub data: QuestionsData,
}

pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    if !state.limiter.try_acquire() {
        return Err(ApiError::RateLimited);
    }

    let Json(request) = payload?;
    let problems = validate_analysis_input(&request.requirement, request.context.as_deref());
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let analysis = state
        .service
        .analyze_requirement(
            &request.requirement,
            request.context.as_deref().unwrap_or(""),
            request.form_data.as_ref(),
        )
        .await
        .map_err(ApiError::Provider)?;

    let seeded = state.engine.seed_with_requirement(
        request.requirement,
        request.form_data,
        request.context,
        analysis.clone(),
    );
    if !seeded {
        info!("History already present, returning analysis without seeding");
    }

    Ok(Json(AnalyzeResponse {
        success: true,
        data: analysis,
        seeded,
    }))
}

pub async fn additional_questions(
    State(state): State<AppState>,
    payload: Result<Json<QuestionsRequest>, JsonRejection>,
) -> Result<Json<QuestionsResponse>, ApiError> {
    if !state.limiter.try_acquire() {
        return Err(ApiError::RateLimited);
    }

    let Json(request) = payload?;
    if request.requirement.chars().count() < MIN_REQUIREMENT_CHARS {
        return Err(ApiError::Validation(vec![format!(
            "Requirement must be at least {} characters",
            MIN_REQUIREMENT_CHARS
        )]));
    }

    let questions = state
        .service
        .generate_additional_questions(
            &request.requirement,
            &request.current_analysis,
            &request.answered_questions,
        )
        .await;

    Ok(Json(QuestionsResponse {
        success: true,
        data: QuestionsData { questions },
    }))
}
