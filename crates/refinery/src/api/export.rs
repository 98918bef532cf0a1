use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;

use refinery_core::HistoryExport;
use refinery_diff::{AnalysisComparison, IterationMetrics};

use super::{ApiError, AppState};

/// 0-based history indices
#[derive(Debug, Deserialize)]
pub struct CompareParams {
    pub from: usize,
    pub to: usize,
}

pub async fn compare(
    State(state): State<AppState>,
    Query(params): Query<CompareParams>,
) -> Result<Json<AnalysisComparison>, ApiError> {
    state
        .engine
        .compare(params.from, params.to)
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Cannot compare iterations at {} and {}",
                params.from, params.to
            ))
        })
}

pub async fn metrics(State(state): State<AppState>) -> Json<IterationMetrics> {
    Json(state.engine.metrics())
}

pub async fn export_history(State(state): State<AppState>) -> Json<HistoryExport> {
    Json(state.engine.export())
}
