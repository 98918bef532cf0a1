mod analyze;
mod error;
mod export;
mod iterations;
mod prompts;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use refinery_analysis::{AnalysisService, PromptService};
use refinery_core::IterationEngine;

use crate::rate_limit::RateLimiter;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<IterationEngine>,
    pub service: Arc<AnalysisService>,
    pub prompts: Arc<PromptService>,
    /// Guards every route that reaches the LLM provider
    pub limiter: Arc<RateLimiter>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze::analyze))
        .route("/api/questions", post(analyze::additional_questions))
        .route(
            "/api/iterations",
            get(iterations::get_history)
                .post(iterations::create_iteration)
                .delete(iterations::reset_history),
        )
        .route("/api/iterations/select", post(iterations::select_iteration))
        .route("/api/iterations/satisfy", post(iterations::mark_satisfied))
        .route("/api/iterations/current", put(iterations::save_current))
        .route("/api/iterations/feedback", put(iterations::set_feedback))
        .route("/api/iterations/compare", get(export::compare))
        .route("/api/iterations/metrics", get(export::metrics))
        .route("/api/export", get(export::export_history))
        .route(
            "/api/prompts",
            get(prompts::get_prompts).post(prompts::generate_prompts),
        )
        .route("/api/prompts/edited", put(prompts::edit_prompt))
        .route("/api/prompts/improve", post(prompts::improve_prompt))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Accept a missing body as the request type's default
fn optional_body<T: Default>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(rejection.into()),
    }
}
