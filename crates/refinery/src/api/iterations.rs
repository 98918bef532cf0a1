use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use refinery_analysis::Analysis;
use refinery_core::{EngineState, Iteration, IterationEngine, IterationFailure, IterationStats};

use super::{optional_body, ApiError, AppState};

/// Full engine snapshot returned by every mutating route
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub iterations: Vec<Iteration>,
    pub current_index: Option<usize>,
    pub stats: IterationStats,
    pub state: EngineState,
    pub can_iterate: bool,
    pub has_unsaved_changes: bool,
    pub user_feedback: String,
}

impl HistoryResponse {
    fn from_engine(engine: &IterationEngine) -> Self {
        Self {
            iterations: engine.iterations(),
            current_index: engine.current_index(),
            stats: engine.get_iteration_stats(),
            state: engine.state(),
            can_iterate: engine.can_iterate(),
            has_unsaved_changes: engine.has_unsaved_changes(),
            user_feedback: engine.user_feedback(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateIterationRequest {
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIterationResponse {
    pub index: usize,
    pub iteration: Iteration,
    pub stats: IterationStats,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SaveCurrentRequest {
    pub analysis: Analysis,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: String,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub removed: usize,
}

pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse::from_engine(&state.engine))
}

pub async fn create_iteration(
    State(state): State<AppState>,
    payload: Result<Json<CreateIterationRequest>, JsonRejection>,
) -> Result<Json<CreateIterationResponse>, ApiError> {
    let request = optional_body(payload)?;
    let engine = &state.engine;

    // Precondition failures must not spend rate-limit budget
    engine.ensure_can_iterate()?;
    if !state.limiter.try_acquire() {
        return Err(ApiError::RateLimited);
    }

    let index = engine
        .try_create_iteration(request.feedback.as_deref())
        .await?;
    let iteration = engine
        .iterations()
        .into_iter()
        .nth(index)
        .ok_or_else(|| ApiError::NotFound(format!("Iteration {} not found", index + 1)))?;

    Ok(Json(CreateIterationResponse {
        index,
        iteration,
        stats: engine.get_iteration_stats(),
    }))
}

pub async fn select_iteration(
    State(state): State<AppState>,
    payload: Result<Json<SelectRequest>, JsonRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Json(request) = payload?;
    let engine = &state.engine;

    if request.index >= engine.iterations().len() {
        return Err(ApiError::NotFound(format!(
            "No iteration at index {}",
            request.index
        )));
    }
    engine.select_iteration(request.index);

    Ok(Json(HistoryResponse::from_engine(engine)))
}

pub async fn mark_satisfied(
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    if !state.engine.mark_satisfied() {
        return Err(IterationFailure::NoCurrentIteration.into());
    }
    Ok(Json(HistoryResponse::from_engine(&state.engine)))
}

pub async fn save_current(
    State(state): State<AppState>,
    payload: Result<Json<SaveCurrentRequest>, JsonRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Json(request) = payload?;

    if !state.engine.save_current_iteration(request.analysis)? {
        return Err(IterationFailure::NoCurrentIteration.into());
    }
    Ok(Json(HistoryResponse::from_engine(&state.engine)))
}

pub async fn set_feedback(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Json(request) = payload?;
    state.engine.set_user_feedback(request.feedback);
    Ok(Json(HistoryResponse::from_engine(&state.engine)))
}

pub async fn reset_history(State(state): State<AppState>) -> Json<ResetResponse> {
    Json(ResetResponse {
        removed: state.engine.reset(),
    })
}
