use chrono::{DateTime, Utc};
use refinery_analysis::{Analysis, AnalysisEdits};
use refinery_diff::Snapshot;
use serde::{Deserialize, Serialize};

/// One versioned snapshot in the refinement history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub analysis: Analysis,
    /// Manual edits applied after generation, as a full overlay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_edits: Option<AnalysisEdits>,
    /// Feedback that was supplied when this iteration was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
    pub iteration_number: usize,
    #[serde(default)]
    pub is_user_satisfied: bool,
}

impl Iteration {
    pub fn new(iteration_number: usize, analysis: Analysis, user_feedback: Option<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: iteration_id(&timestamp, iteration_number),
            timestamp,
            analysis,
            user_edits: None,
            user_feedback,
            iteration_number,
            is_user_satisfied: false,
        }
    }

    pub fn has_edits(&self) -> bool {
        self.user_edits.is_some()
    }

    /// e.g. `12 analysis items, 3 questions, no assumptions`
    pub fn summary(&self) -> String {
        self.analysis.summary()
    }
}

/// `iter_{millis}_{n}`; the sequence number keeps ids unique within a millisecond
fn iteration_id(timestamp: &DateTime<Utc>, iteration_number: usize) -> String {
    format!("iter_{}_{}", timestamp.timestamp_millis(), iteration_number)
}

impl Snapshot for Iteration {
    fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    fn is_satisfied(&self) -> bool {
        self.is_user_satisfied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_iteration_defaults() {
        let iteration = Iteration::new(3, Analysis::default(), Some("tighten scope".into()));
        assert!(iteration.id.starts_with("iter_"));
        assert!(iteration.id.ends_with("_3"));
        assert!(!iteration.is_user_satisfied);
        assert!(!iteration.has_edits());
    }

    #[test]
    fn test_wire_format() {
        let iteration = Iteration::new(1, Analysis::default(), None);
        let json = serde_json::to_value(&iteration).unwrap();

        assert_eq!(json["iterationNumber"], 1);
        assert_eq!(json["isUserSatisfied"], false);
        assert!(json.get("userEdits").is_none());
        assert!(json.get("userFeedback").is_none());
        assert!(json["analysis"]["edgeCases"].is_array());
    }

    #[test]
    fn test_missing_satisfied_flag_defaults_false() {
        let json = r#"{
            "id": "iter_1",
            "timestamp": "2024-05-01T10:00:00Z",
            "analysis": {"goals": ["A"]},
            "iterationNumber": 1
        }"#;
        let iteration: Iteration = serde_json::from_str(json).unwrap();
        assert!(!iteration.is_user_satisfied);
        assert_eq!(iteration.analysis.goals, vec!["A"]);
    }
}
