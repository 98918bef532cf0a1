use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use refinery_analysis::AnalysisError;
use refinery_core::IterationFailure;
use refinery_provider::ProviderError;

#[derive(Debug)]
pub enum ApiError {
    /// Request body failed validation
    Validation(Vec<String>),
    RateLimited,
    Provider(ProviderError),
    Iteration(IterationFailure),
    InvalidAnalysis(AnalysisError),
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, code, details) = match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                "Invalid request data".to_string(),
                None,
                details,
            ),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please wait before trying again.".to_string(),
                Some("RATE_LIMIT"),
                Vec::new(),
            ),
            ApiError::Provider(err) => {
                tracing::error!(code = err.code(), error = %err, "Provider call failed");
                (provider_status(&err), err.to_string(), Some(err.code()), Vec::new())
            }
            ApiError::Iteration(failure) => {
                let conflict = failure.is_rejection()
                    || matches!(failure, IterationFailure::HistoryReset { .. });
                let status = if conflict {
                    StatusCode::CONFLICT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, failure.to_string(), Some(failure.code()), Vec::new())
            }
            ApiError::InvalidAnalysis(err) => (
                StatusCode::BAD_REQUEST,
                err.to_string(),
                Some("VALIDATION_ERROR"),
                Vec::new(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Some("NOT_FOUND"), Vec::new()),
        };

        let body = Json(ErrorResponse {
            error,
            code,
            details,
        });

        (status, body).into_response()
    }
}

fn provider_status(err: &ProviderError) -> StatusCode {
    match err {
        ProviderError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ProviderError::Unauthorized => StatusCode::UNAUTHORIZED,
        ProviderError::Forbidden => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(vec![rejection.body_text()])
    }
}

impl From<IterationFailure> for ApiError {
    fn from(failure: IterationFailure) -> Self {
        ApiError::Iteration(failure)
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::InvalidAnalysis(err)
    }
}
