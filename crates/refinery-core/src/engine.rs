use refinery_analysis::{
    Analysis, AnalysisEdits, AnalysisError, GeneratedPrompts, IdeKind, RefinementRequest, Refiner,
    RequirementForm,
};
use refinery_diff::{calculate_iteration_metrics, compare_analyses, AnalysisComparison, IterationMetrics};
use refinery_logging::{LogEvent, Logger};
use refinery_store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::IterationFailure;
use crate::export::HistoryExport;
use crate::history::{IterationStore, PersistError, PromptSet, RequirementSession};
use crate::iteration::Iteration;

/// Default upper bound on a single refinement call
pub const DEFAULT_REFINE_TIMEOUT: Duration = Duration::from_secs(120);

/// Observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EngineState {
    Empty,
    Ready { at: usize },
    Refining { at: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationStats {
    pub total: usize,
    pub satisfied: usize,
    /// 1-based position of the current iteration, 0 when empty
    pub current: usize,
}

struct EngineInner {
    store: IterationStore,
    session: RequirementSession,
    prompts: PromptSet,
    /// Index the in-flight refinement started from
    refining: Option<usize>,
    feedback: String,
    unsaved: bool,
    /// Bumped on reset so a late refinement result is not committed to a new history
    generation: u64,
}

/// Manages successive refinements of an analysis.
///
/// All operations except [`try_create_iteration`](Self::try_create_iteration)
/// are synchronous. The internal lock is never held across the refiner call.
pub struct IterationEngine {
    refiner: Arc<dyn Refiner>,
    inner: Mutex<EngineInner>,
    logger: Option<Arc<Logger>>,
    timeout: Option<Duration>,
}

/// Clears the refining state when the in-flight call ends or its future is dropped
struct RefiningGuard<'a> {
    engine: &'a IterationEngine,
}

impl Drop for RefiningGuard<'_> {
    fn drop(&mut self) {
        self.engine.lock().refining = None;
    }
}

impl IterationEngine {
    /// Create an engine over persisted history in `kv`
    pub fn new(refiner: Arc<dyn Refiner>, kv: Arc<dyn KeyValueStore>) -> Self {
        let store = IterationStore::load(kv);
        let session = store.load_session();
        let prompts = store.load_prompts();
        Self {
            refiner,
            inner: Mutex::new(EngineInner {
                store,
                session,
                prompts,
                refining: None,
                feedback: String::new(),
                unsaved: false,
                generation: 0,
            }),
            logger: None,
            timeout: Some(DEFAULT_REFINE_TIMEOUT),
        }
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        let stats = self.get_iteration_stats();
        logger.log(&LogEvent::HistoryLoaded {
            iterations: stats.total,
            current: stats.current,
        });
        self.logger = Some(logger);
        self
    }

    /// `None` disables the timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LogEvent) {
        if let Some(ref logger) = self.logger {
            logger.log(&event);
        }
    }

    /// Best-effort write; failures degrade durability but never the session
    fn persist(&self, inner: &EngineInner) {
        self.report(inner.store.save(), "iteration history");
    }

    fn report(&self, result: Result<(), PersistError>, what: &str) {
        if let Err(e) = result {
            warn!(error = %e, what, "Failed to persist");
            self.emit(LogEvent::PersistFailed {
                error: e.to_string(),
            });
        }
    }

    // --- requirement ---

    /// Record the requirement being refined
    pub fn set_requirement(
        &self,
        requirement: impl Into<String>,
        form: Option<RequirementForm>,
        context: Option<String>,
    ) {
        let mut inner = self.lock();
        inner.session = RequirementSession::new(requirement, form, context);
        self.report(inner.store.save_session(&inner.session), "requirement");
    }

    pub fn session(&self) -> RequirementSession {
        self.lock().session.clone()
    }

    // --- feedback buffer and unsaved flag ---

    pub fn set_user_feedback(&self, feedback: impl Into<String>) {
        self.lock().feedback = feedback.into();
    }

    pub fn user_feedback(&self) -> String {
        self.lock().feedback.clone()
    }

    pub fn mark_unsaved_changes(&self) {
        self.lock().unsaved = true;
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.lock().unsaved
    }

    // --- lifecycle ---

    /// Create iteration #1 from an initial analysis. Only applies to an empty history.
    pub fn seed(&self, initial: Analysis) -> bool {
        self.seed_locked(initial, None)
    }

    /// Record the requirement and create iteration #1 from its analysis in one step.
    ///
    /// Returns false, leaving both the stored requirement and the history
    /// untouched, when a history already exists.
    pub fn seed_with_requirement(
        &self,
        requirement: impl Into<String>,
        form: Option<RequirementForm>,
        context: Option<String>,
        initial: Analysis,
    ) -> bool {
        let session = RequirementSession::new(requirement, form, context);
        self.seed_locked(initial, Some(session))
    }

    fn seed_locked(&self, initial: Analysis, session: Option<RequirementSession>) -> bool {
        let mut inner = self.lock();
        if !inner.store.is_empty() {
            debug!("History already present, not seeding");
            return false;
        }

        let iteration = Iteration::new(1, initial, None);
        let event = LogEvent::HistorySeeded {
            iteration_id: iteration.id.clone(),
            items: iteration.analysis.item_count(),
        };
        inner.store.push(iteration);
        let saved = match session {
            Some(session) => {
                let saved = inner.store.save_with_session(&session);
                inner.session = session;
                saved
            }
            None => inner.store.save(),
        };
        self.report(saved, "seeded history");
        drop(inner);

        info!("Seeded iteration history");
        self.emit(event);
        true
    }

    /// Clear history, pointer, buffers, prompts and the stored requirement.
    /// Returns the number of iterations removed.
    pub fn reset(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.store.len();

        if let Err(e) = inner.store.clear() {
            warn!(error = %e, "Failed to remove persisted session");
        }
        inner.session = RequirementSession::default();
        inner.prompts = PromptSet::default();
        inner.feedback.clear();
        inner.unsaved = false;
        inner.generation += 1;
        drop(inner);

        self.emit(LogEvent::HistoryReset { removed });
        removed
    }

    // --- coding-assistant prompts ---

    pub fn prompts(&self) -> PromptSet {
        self.lock().prompts.clone()
    }

    /// Store a freshly generated set. Earlier edits no longer apply and are dropped.
    pub fn set_generated_prompts(&self, generated: GeneratedPrompts) {
        let mut inner = self.lock();
        inner.prompts = PromptSet {
            generated: Some(generated),
            edited: Default::default(),
        };
        self.report(inner.store.save_prompts(&inner.prompts), "prompts");
        drop(inner);

        info!("Stored generated prompts");
    }

    /// Replace one assistant's prompt with an edited or improved version
    pub fn set_edited_prompt(&self, ide: IdeKind, prompt: impl Into<String>) {
        let mut inner = self.lock();
        inner.prompts.edited.insert(ide, prompt.into());
        self.report(inner.store.save_prompts(&inner.prompts), "prompts");
    }

    /// The edited prompt when there is one, else the generated one
    pub fn prompt_for(&self, ide: IdeKind) -> Option<String> {
        let inner = self.lock();
        inner
            .prompts
            .edited
            .get(&ide)
            .cloned()
            .or_else(|| {
                inner
                    .prompts
                    .generated
                    .as_ref()
                    .map(|g| g.get(ide).to_string())
            })
    }

    // --- iteration ---

    /// Request the next iteration. Returns whether one was created.
    pub async fn create_iteration(&self, feedback: Option<&str>) -> bool {
        self.try_create_iteration(feedback).await.is_ok()
    }

    /// Request the next iteration, returning the new current index.
    ///
    /// A second call while one is in flight is rejected immediately. On any
    /// failure the history and pointer are unchanged and the pending feedback
    /// buffer is kept for a retry.
    pub async fn try_create_iteration(
        &self,
        feedback: Option<&str>,
    ) -> Result<usize, IterationFailure> {
        let prepared = {
            let mut inner = self.lock();
            let prepared = Self::prepare(&inner, feedback);
            if prepared.is_ok() {
                inner.refining = inner.store.current_index();
            }
            let from = inner.store.current_index().unwrap_or_default();
            prepared.map(|request| (request, from, inner.generation))
        };
        let (request, from, generation) = match prepared {
            Ok(prepared) => prepared,
            Err(failure) => {
                debug!(reason = %failure, "Iteration request rejected");
                self.emit(LogEvent::IterationRejected {
                    reason: failure.to_string(),
                });
                return Err(failure);
            }
        };
        let _guard = RefiningGuard { engine: self };

        let number = request.iteration_number;
        self.emit(LogEvent::IterationRequested {
            from_iteration: from + 1,
            iteration_number: number,
            has_edits: request.user_edits.is_some(),
            has_feedback: request.user_feedback.is_some(),
        });

        let started = Instant::now();
        let result = self.call_refiner(&request).await.and_then(|analysis| {
            analysis.validate()?;
            Ok(analysis)
        });

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(failure) => {
                warn!(iteration = number, code = failure.code(), error = %failure, "Iteration failed");
                self.emit(LogEvent::IterationFailed {
                    iteration_number: number,
                    code: failure.code().to_string(),
                    error: failure.to_string(),
                });
                return Err(failure);
            }
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            drop(inner);
            let failure = IterationFailure::HistoryReset { iteration: number };
            warn!(iteration = number, "History was reset during refinement, discarding result");
            self.emit(LogEvent::IterationFailed {
                iteration_number: number,
                code: failure.code().to_string(),
                error: failure.to_string(),
            });
            return Err(failure);
        }

        let iteration = Iteration::new(number, analysis, request.user_feedback);
        let event = LogEvent::IterationCreated {
            iteration_number: number,
            iteration_id: iteration.id.clone(),
            items: iteration.analysis.item_count(),
            duration_secs: started.elapsed().as_secs_f64(),
        };
        let index = inner.store.push(iteration);
        inner.feedback.clear();
        inner.unsaved = false;
        inner.refining = None;
        self.persist(&inner);
        drop(inner);

        info!(iteration = number, "Created iteration");
        self.emit(event);
        Ok(index)
    }

    fn prepare(
        inner: &EngineInner,
        feedback: Option<&str>,
    ) -> Result<RefinementRequest, IterationFailure> {
        let current = inner
            .store
            .current()
            .ok_or(IterationFailure::NoCurrentIteration)?;
        if inner.refining.is_some() {
            return Err(IterationFailure::RefinementInFlight);
        }
        if current.is_user_satisfied {
            return Err(IterationFailure::AlreadySatisfied);
        }

        let feedback = feedback
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .or_else(|| Some(inner.feedback.trim()).filter(|f| !f.is_empty()))
            .map(str::to_string);

        Ok(RefinementRequest {
            requirement: inner.session.requirement.clone(),
            form: inner.session.form.clone(),
            context_summary: inner.session.context.clone(),
            previous_analysis: current.analysis.clone(),
            previous_iteration_number: current.iteration_number,
            user_edits: current.user_edits.clone(),
            user_feedback: feedback,
            iteration_number: inner.store.len() + 1,
        })
    }

    async fn call_refiner(&self, request: &RefinementRequest) -> Result<Analysis, IterationFailure> {
        let call = self.refiner.refine(request);
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(IterationFailure::from),
                Err(_) => Err(IterationFailure::TimedOut {
                    iteration: request.iteration_number,
                    after: limit,
                }),
            },
            None => call.await.map_err(IterationFailure::from),
        }
    }

    // --- navigation and edits ---

    /// Move the pointer. Out-of-range or unchanged indices are a no-op.
    pub fn select_iteration(&self, index: usize) -> bool {
        let mut inner = self.lock();
        if inner.store.current_index() == Some(index) || !inner.store.select(index) {
            return false;
        }
        inner.unsaved = false;
        self.persist(&inner);
        drop(inner);

        self.emit(LogEvent::IterationSelected {
            iteration_number: index + 1,
        });
        true
    }

    /// Mark the current iteration satisfied. One-way and idempotent.
    pub fn mark_satisfied(&self) -> bool {
        let mut inner = self.lock();
        let Some(current) = inner.store.current_mut() else {
            return false;
        };
        current.is_user_satisfied = true;
        let number = current.iteration_number;
        self.persist(&inner);
        drop(inner);

        self.emit(LogEvent::MarkedSatisfied {
            iteration_number: number,
        });
        true
    }

    /// Overwrite the current iteration's analysis and record it as the user's edits.
    ///
    /// Returns `Ok(false)` when there is no current iteration.
    pub fn save_current_iteration(&self, analysis: Analysis) -> Result<bool, AnalysisError> {
        analysis.validate()?;

        let mut inner = self.lock();
        let Some(current) = inner.store.current_mut() else {
            return Ok(false);
        };
        current.user_edits = Some(AnalysisEdits::from(analysis.clone()));
        current.analysis = analysis;
        let event = LogEvent::IterationSaved {
            iteration_number: current.iteration_number,
            items: current.analysis.item_count(),
        };
        inner.unsaved = false;
        self.persist(&inner);
        drop(inner);

        self.emit(event);
        Ok(true)
    }

    // --- reads ---

    pub fn get_current_analysis(&self) -> Option<Analysis> {
        self.lock().store.current().map(|i| i.analysis.clone())
    }

    pub fn can_iterate(&self) -> bool {
        self.ensure_can_iterate().is_ok()
    }

    /// Why an iteration request would be rejected right now, without issuing one
    pub fn ensure_can_iterate(&self) -> Result<(), IterationFailure> {
        Self::prepare(&self.lock(), None).map(|_| ())
    }

    pub fn is_iterating(&self) -> bool {
        self.lock().refining.is_some()
    }

    pub fn get_iteration_stats(&self) -> IterationStats {
        let inner = self.lock();
        let iterations = inner.store.iterations();
        IterationStats {
            total: iterations.len(),
            satisfied: iterations.iter().filter(|i| i.is_user_satisfied).count(),
            current: inner.store.current_index().map_or(0, |i| i + 1),
        }
    }

    pub fn state(&self) -> EngineState {
        let inner = self.lock();
        match (inner.store.current_index(), inner.refining) {
            (None, _) => EngineState::Empty,
            (Some(_), Some(from)) => EngineState::Refining { at: from },
            (Some(at), None) => EngineState::Ready { at },
        }
    }

    pub fn iterations(&self) -> Vec<Iteration> {
        self.lock().store.iterations().to_vec()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.lock().store.current_index()
    }

    pub fn current_iteration(&self) -> Option<Iteration> {
        self.lock().store.current().cloned()
    }

    /// Compare two stored iterations by index
    pub fn compare(&self, from: usize, to: usize) -> Option<AnalysisComparison> {
        let inner = self.lock();
        let before = inner.store.get(from)?;
        let after = inner.store.get(to)?;
        Some(compare_analyses(&before.analysis, &after.analysis))
    }

    pub fn metrics(&self) -> IterationMetrics {
        calculate_iteration_metrics(self.lock().store.iterations())
    }

    pub fn export(&self) -> HistoryExport {
        let inner = self.lock();
        HistoryExport::new(&inner.session, inner.store.iterations())
    }
}
