//! # refinery-analysis
//!
//! The requirement analysis model and the LLM-backed service that produces
//! and refines it.
//!
//! ## Key Types
//!
//! - [`Analysis`] - Structured breakdown of a requirement
//! - [`AnalysisEdits`] - Partial overlay of manual user edits
//! - [`Refiner`] - Produces the next analysis from the previous one
//! - [`AnalysisService`] - [`Refiner`] implementation over an [`LlmProvider`](refinery_provider::LlmProvider)
//! - [`PromptService`] - Coding-assistant prompts built from a finished analysis
//!
//! Model output is never trusted as-is: every reply passes through the
//! ingestion rules in [`ingest`] before it becomes an [`Analysis`].

mod form;
mod ide;
pub mod ingest;
pub mod model;
mod prompt_service;
pub mod prompts;
mod service;
mod telemetry;

pub use form::RequirementForm;
pub use ide::{EditedPrompts, GeneratedPrompts, IdeKind, IdePrompts, PromptInput};
pub use ingest::IdScheme;
pub use model::{
    clamp_confidence, Analysis, AnalysisEdits, AnalysisError, Assumption, ListField, Priority,
    Question,
};
pub use prompt_service::PromptService;
pub use service::{AnalysisService, RefineError, RefinementRequest, Refiner};
pub use telemetry::{log_prompt_usage, PromptMode, PromptSettings, PromptUsage};
