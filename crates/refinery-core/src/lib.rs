//! # refinery-core
//!
//! The iteration engine: successive refinements of a requirement analysis,
//! with user edits, feedback, satisfaction tracking and comparison.
//!
//! ## States
//!
//! - `Empty` - no history yet; seed it with an initial analysis
//! - `Ready { at }` - iteration `at` is current
//! - `Refining { at }` - a refinement from iteration `at` is in flight; further
//!   iteration requests are rejected until it resolves
//!
//! History is persisted through a [`KeyValueStore`](refinery_store::KeyValueStore)
//! after every mutation.

mod engine;
mod error;
mod export;
mod history;
mod iteration;

pub use engine::{EngineState, IterationEngine, IterationStats, DEFAULT_REFINE_TIMEOUT};
pub use error::IterationFailure;
pub use export::{ExportedIteration, HistoryExport};
pub use history::{
    IterationStore, PersistError, PromptSet, RequirementSession, ANALYSIS_KEY, CONTEXT_KEY,
    EDITED_PROMPTS_KEY, FORM_KEY, INDEX_KEY, ITERATIONS_KEY, PROMPTS_KEY, REQUIREMENT_KEY,
};
pub use iteration::Iteration;
