//! Iteration history and its persistence to the key-value store.

use refinery_analysis::{EditedPrompts, GeneratedPrompts, RequirementForm};
use refinery_store::{KeyValueStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::iteration::Iteration;

pub const ITERATIONS_KEY: &str = "currentIterations";
pub const INDEX_KEY: &str = "currentIterationIndex";
/// Mirror of the current iteration's analysis, for readers that only need that
pub const ANALYSIS_KEY: &str = "currentAnalysis";
pub const REQUIREMENT_KEY: &str = "currentRequirement";
pub const FORM_KEY: &str = "currentFormData";
pub const CONTEXT_KEY: &str = "currentContext";
pub const PROMPTS_KEY: &str = "currentPrompts";
pub const EDITED_PROMPTS_KEY: &str = "currentEditedPrompts";

/// Every key the session owns
const ALL_KEYS: [&str; 8] = [
    ITERATIONS_KEY,
    INDEX_KEY,
    ANALYSIS_KEY,
    REQUIREMENT_KEY,
    FORM_KEY,
    CONTEXT_KEY,
    PROMPTS_KEY,
    EDITED_PROMPTS_KEY,
];

/// Pending writes; `None` removes the key
type Batch = Vec<(&'static str, Option<String>)>;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write history: {0}")]
    Store(#[from] StoreError),
}

/// The requirement the history is refining
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementSession {
    pub requirement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<RequirementForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl RequirementSession {
    /// Blank context is not stored
    pub fn new(
        requirement: impl Into<String>,
        form: Option<RequirementForm>,
        context: Option<String>,
    ) -> Self {
        Self {
            requirement: requirement.into(),
            form,
            context: context.filter(|c| !c.trim().is_empty()),
        }
    }
}

/// Coding-assistant prompts generated from the current analysis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptSet {
    pub generated: Option<GeneratedPrompts>,
    pub edited: EditedPrompts,
}

impl PromptSet {
    /// Generated prompts with every edit applied over them
    pub fn effective(&self) -> Option<GeneratedPrompts> {
        let mut prompts = self.generated.clone()?;
        for (&ide, edited) in &self.edited {
            *prompts.get_mut(ide) = edited.clone();
        }
        Some(prompts)
    }
}

/// Ordered iteration log with a current pointer.
///
/// `current < iterations.len()` whenever the log is non-empty.
pub struct IterationStore {
    kv: Arc<dyn KeyValueStore>,
    iterations: Vec<Iteration>,
    current: usize,
}

impl IterationStore {
    /// Create an empty store without touching persisted state
    pub fn empty(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            iterations: Vec::new(),
            current: 0,
        }
    }

    /// Rehydrate from the key-value store.
    ///
    /// Missing keys mean an empty history. Unreadable or malformed entries are
    /// logged and treated the same way.
    pub fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        let iterations: Vec<Iteration> = read_json(kv.as_ref(), ITERATIONS_KEY).unwrap_or_default();
        let index: usize = if iterations.is_empty() {
            0
        } else {
            read_json(kv.as_ref(), INDEX_KEY).unwrap_or(0)
        };

        let mut store = Self {
            kv,
            iterations,
            current: 0,
        };
        store.current = store.clamp(index);

        debug!(
            iterations = store.iterations.len(),
            current = store.current,
            "Loaded iteration history"
        );
        store
    }

    fn clamp(&self, index: usize) -> usize {
        index.min(self.iterations.len().saturating_sub(1))
    }

    /// Write the history, pointer and analysis mirror as one batch
    pub fn save(&self) -> Result<(), PersistError> {
        self.write(self.history_batch()?)
    }

    /// Write the history together with the requirement it refines
    pub fn save_with_session(&self, session: &RequirementSession) -> Result<(), PersistError> {
        let mut batch = self.history_batch()?;
        batch.extend(session_batch(session)?);
        self.write(batch)
    }

    fn history_batch(&self) -> Result<Batch, PersistError> {
        let analysis = match self.current() {
            Some(current) => Some(serde_json::to_string(&current.analysis)?),
            None => None,
        };
        Ok(vec![
            (ITERATIONS_KEY, Some(serde_json::to_string(&self.iterations)?)),
            (INDEX_KEY, Some(self.current.to_string())),
            (ANALYSIS_KEY, analysis),
        ])
    }

    fn write(&self, batch: Batch) -> Result<(), PersistError> {
        let entries: Vec<(&str, Option<&str>)> = batch
            .iter()
            .map(|(key, value)| (*key, value.as_deref()))
            .collect();
        self.kv.write_batch(&entries)?;
        Ok(())
    }

    /// Drop the in-memory history and every persisted session key
    pub fn clear(&mut self) -> Result<(), PersistError> {
        self.iterations.clear();
        self.current = 0;
        self.write(ALL_KEYS.iter().map(|key| (*key, None)).collect())
    }

    pub fn load_session(&self) -> RequirementSession {
        let requirement = match self.kv.get(REQUIREMENT_KEY) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to read stored requirement");
                String::new()
            }
        };
        let context = self.kv.get(CONTEXT_KEY).ok().flatten();

        RequirementSession {
            requirement,
            form: read_json(self.kv.as_ref(), FORM_KEY),
            context,
        }
    }

    pub fn save_session(&self, session: &RequirementSession) -> Result<(), PersistError> {
        self.write(session_batch(session)?)
    }

    pub fn load_prompts(&self) -> PromptSet {
        PromptSet {
            generated: read_json(self.kv.as_ref(), PROMPTS_KEY),
            edited: read_json(self.kv.as_ref(), EDITED_PROMPTS_KEY).unwrap_or_default(),
        }
    }

    pub fn save_prompts(&self, prompts: &PromptSet) -> Result<(), PersistError> {
        let generated = match prompts.generated {
            Some(ref generated) => Some(serde_json::to_string(generated)?),
            None => None,
        };
        self.write(vec![
            (PROMPTS_KEY, generated),
            (EDITED_PROMPTS_KEY, Some(serde_json::to_string(&prompts.edited)?)),
        ])
    }

    pub fn iterations(&self) -> &[Iteration] {
        &self.iterations
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Current pointer, or `None` for an empty history
    pub fn current_index(&self) -> Option<usize> {
        (!self.iterations.is_empty()).then_some(self.current)
    }

    pub fn current(&self) -> Option<&Iteration> {
        self.iterations.get(self.current)
    }

    pub fn current_mut(&mut self) -> Option<&mut Iteration> {
        self.iterations.get_mut(self.current)
    }

    pub fn get(&self, index: usize) -> Option<&Iteration> {
        self.iterations.get(index)
    }

    /// Append an iteration and move the pointer to it
    pub fn push(&mut self, iteration: Iteration) -> usize {
        self.iterations.push(iteration);
        self.current = self.iterations.len() - 1;
        self.current
    }

    /// Move the pointer; returns false when out of range
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.iterations.len() {
            return false;
        }
        self.current = index;
        true
    }
}

fn session_batch(session: &RequirementSession) -> Result<Batch, PersistError> {
    let form = match session.form {
        Some(ref form) => Some(serde_json::to_string(form)?),
        None => None,
    };
    Ok(vec![
        (REQUIREMENT_KEY, Some(session.requirement.clone())),
        (FORM_KEY, form),
        (CONTEXT_KEY, session.context.clone()),
    ])
}

fn read_json<T: serde::de::DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match kv.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "Failed to read persisted value");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Ignoring malformed persisted value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinery_analysis::{Analysis, IdeKind};
    use refinery_store::{MemoryStore, StoreError};
    use std::sync::Mutex;

    /// Records batches and refuses every single-key write
    #[derive(Default)]
    struct BatchOnlyStore {
        inner: MemoryStore,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl KeyValueStore for BatchOnlyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::QuotaExceeded(format!("unbatched write to {}", key)))
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            Err(StoreError::QuotaExceeded(format!("unbatched remove of {}", key)))
        }

        fn write_batch(&self, entries: &[(&str, Option<&str>)]) -> Result<(), StoreError> {
            self.batches
                .lock()
                .unwrap()
                .push(entries.iter().map(|(key, _)| key.to_string()).collect());
            self.inner.write_batch(entries)
        }
    }

    fn analysis(goals: &[&str]) -> Analysis {
        Analysis {
            goals: goals.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        }
    }

    fn store_with(kv: &Arc<MemoryStore>, n: usize) -> IterationStore {
        let mut store = IterationStore::empty(kv.clone());
        for i in 1..=n {
            store.push(Iteration::new(i, analysis(&["goal"]), None));
        }
        store
    }

    #[test]
    fn test_missing_keys_load_empty() {
        let kv = Arc::new(MemoryStore::new());
        let store = IterationStore::load(kv);
        assert!(store.is_empty());
        assert_eq!(store.current_index(), None);
        assert!(store.current().is_none());
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = store_with(&kv, 3);
        store.select(1);
        store.current_mut().unwrap().is_user_satisfied = true;
        store.save().unwrap();

        let loaded = IterationStore::load(kv.clone());
        assert_eq!(loaded.iterations(), store.iterations());
        assert_eq!(loaded.current_index(), Some(1));
        assert_eq!(kv.get(INDEX_KEY).unwrap().as_deref(), Some("1"));
        assert!(kv.get(ANALYSIS_KEY).unwrap().is_some());
    }

    #[test]
    fn test_malformed_history_loads_empty() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(ITERATIONS_KEY, "{not json").unwrap();
        kv.set(INDEX_KEY, "4").unwrap();

        let store = IterationStore::load(kv);
        assert!(store.is_empty());
        assert_eq!(store.current_index(), None);
    }

    #[test]
    fn test_out_of_range_index_is_clamped() {
        let kv = Arc::new(MemoryStore::new());
        store_with(&kv, 2).save().unwrap();
        kv.set(INDEX_KEY, "9").unwrap();

        assert_eq!(IterationStore::load(kv.clone()).current_index(), Some(1));

        kv.set(INDEX_KEY, "-1").unwrap();
        assert_eq!(IterationStore::load(kv).current_index(), Some(0));
    }

    #[test]
    fn test_missing_index_defaults_to_first() {
        let kv = Arc::new(MemoryStore::new());
        store_with(&kv, 2).save().unwrap();
        kv.remove(INDEX_KEY).unwrap();

        assert_eq!(IterationStore::load(kv).current_index(), Some(0));
    }

    #[test]
    fn test_select_rejects_out_of_range() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = store_with(&kv, 2);
        assert!(!store.select(2));
        assert_eq!(store.current_index(), Some(1));
        assert!(store.select(0));
        assert_eq!(store.current_index(), Some(0));
    }

    #[test]
    fn test_clear_removes_keys() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = store_with(&kv, 1);
        store.save().unwrap();

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(kv.get(ITERATIONS_KEY).unwrap().is_none());
        assert!(kv.get(INDEX_KEY).unwrap().is_none());
    }

    #[test]
    fn test_save_is_one_batch() {
        let kv = Arc::new(BatchOnlyStore::default());
        let mut store = IterationStore::empty(kv.clone());
        store.push(Iteration::new(1, analysis(&["goal"]), None));

        store.save().unwrap();
        store
            .save_with_session(&RequirementSession {
                requirement: "Add login".into(),
                ..Default::default()
            })
            .unwrap();

        let batches = kv.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec![ITERATIONS_KEY, INDEX_KEY, ANALYSIS_KEY]);
        assert!(batches[1].contains(&ITERATIONS_KEY.to_string()));
        assert!(batches[1].contains(&REQUIREMENT_KEY.to_string()));
        assert_eq!(kv.get(REQUIREMENT_KEY).unwrap().as_deref(), Some("Add login"));
        assert_eq!(IterationStore::load(kv.clone()).len(), 1);
    }

    #[test]
    fn test_prompts_roundtrip_and_clear() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = store_with(&kv, 1);
        let prompts = PromptSet {
            generated: Some(GeneratedPrompts {
                cursor: "c".into(),
                copilot: "p".into(),
                warp: "w".into(),
                windsurf: "s".into(),
            }),
            edited: [(IdeKind::Warp, "w2".to_string())].into_iter().collect(),
        };
        store.save_prompts(&prompts).unwrap();
        assert_eq!(store.load_prompts(), prompts);

        let effective = prompts.effective().unwrap();
        assert_eq!(effective.warp, "w2");
        assert_eq!(effective.cursor, "c");
        assert_eq!(PromptSet::default().effective(), None);

        store.save_session(&RequirementSession::default()).unwrap();
        store.clear().unwrap();
        assert!(kv.is_empty());
        assert_eq!(store.load_prompts(), PromptSet::default());
    }

    #[test]
    fn test_session_roundtrip() {
        let kv = Arc::new(MemoryStore::new());
        let store = IterationStore::empty(kv.clone());
        let session = RequirementSession {
            requirement: "Add login".into(),
            form: Some(RequirementForm {
                goal: Some("Auth".into()),
                ..Default::default()
            }),
            context: None,
        };
        store.save_session(&session).unwrap();

        assert_eq!(IterationStore::empty(kv).load_session(), session);
    }
}
