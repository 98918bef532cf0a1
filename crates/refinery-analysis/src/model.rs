use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// The structured breakdown of a requirement that gets refined across iterations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Analysis {
    pub goals: Vec<String>,
    pub constraints: Vec<String>,
    pub dependencies: Vec<String>,
    pub edge_cases: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub questions: Vec<Question>,
    pub assumptions: Vec<Assumption>,
}

/// A clarifying question raised by the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            priority,
            answer: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.answer.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Critical,
    #[default]
    Important,
    NiceToHave,
}

impl Priority {
    /// Lenient parse for model output; unknown values fall back to `Important`
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "critical" | "high" => Priority::Critical,
            "nice-to-have" | "low" | "optional" => Priority::NiceToHave,
            _ => Priority::Important,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::Important => write!(f, "important"),
            Priority::NiceToHave => write!(f, "nice-to-have"),
        }
    }
}

/// An assumption the analysis made, with the model's confidence in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub id: String,
    pub text: String,
    /// Always within [0.0, 1.0]; clamped on deserialization
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: f64,
    pub accepted: bool,
}

impl Assumption {
    pub fn new(id: impl Into<String>, text: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            confidence: clamp_confidence(confidence),
            accepted: true,
        }
    }
}

/// Clamp a confidence value into [0, 1]. Non-finite values become 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(clamp_confidence(value))
}

/// The five plain string-list fields of an [`Analysis`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListField {
    Goals,
    Constraints,
    Dependencies,
    EdgeCases,
    AcceptanceCriteria,
}

impl ListField {
    pub const ALL: [ListField; 5] = [
        ListField::Goals,
        ListField::Constraints,
        ListField::Dependencies,
        ListField::EdgeCases,
        ListField::AcceptanceCriteria,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ListField::Goals => "Goals",
            ListField::Constraints => "Constraints",
            ListField::Dependencies => "Dependencies",
            ListField::EdgeCases => "Edge Cases",
            ListField::AcceptanceCriteria => "Acceptance Criteria",
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum AnalysisError {
    #[error("Duplicate question id: {0}")]
    DuplicateQuestionId(String),

    #[error("Duplicate assumption id: {0}")]
    DuplicateAssumptionId(String),

    #[error("Assumption {id} has confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { id: String, value: f64 },
}

impl Analysis {
    pub fn list(&self, field: ListField) -> &[String] {
        match field {
            ListField::Goals => &self.goals,
            ListField::Constraints => &self.constraints,
            ListField::Dependencies => &self.dependencies,
            ListField::EdgeCases => &self.edge_cases,
            ListField::AcceptanceCriteria => &self.acceptance_criteria,
        }
    }

    /// Total number of entries across the five string-list fields
    pub fn item_count(&self) -> usize {
        ListField::ALL.iter().map(|f| self.list(*f).len()).sum()
    }

    pub fn accepted_assumptions(&self) -> usize {
        self.assumptions.iter().filter(|a| a.accepted).count()
    }

    /// One-line human summary, e.g. `7 analysis items, 2 questions, no assumptions`
    pub fn summary(&self) -> String {
        let questions = match self.questions.len() {
            0 => "no questions".to_string(),
            n => format!("{} questions", n),
        };
        let assumptions = match self.assumptions.len() {
            0 => "no assumptions".to_string(),
            n => format!("{} assumptions ({} accepted)", n, self.accepted_assumptions()),
        };
        format!(
            "{} analysis items, {}, {}",
            self.item_count(),
            questions,
            assumptions
        )
    }

    /// Check id uniqueness and confidence range
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let mut seen = HashSet::new();
        for q in &self.questions {
            if !seen.insert(q.id.as_str()) {
                return Err(AnalysisError::DuplicateQuestionId(q.id.clone()));
            }
        }

        let mut seen = HashSet::new();
        for a in &self.assumptions {
            if !seen.insert(a.id.as_str()) {
                return Err(AnalysisError::DuplicateAssumptionId(a.id.clone()));
            }
            if !(0.0..=1.0).contains(&a.confidence) {
                return Err(AnalysisError::ConfidenceOutOfRange {
                    id: a.id.clone(),
                    value: a.confidence,
                });
            }
        }

        Ok(())
    }
}

/// Partial overlay of an [`Analysis`] carrying manual user edits.
///
/// A field that is `None` was not edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisEdits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_cases: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<Question>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<Vec<Assumption>>,
}

impl AnalysisEdits {
    pub fn is_empty(&self) -> bool {
        self == &AnalysisEdits::default()
    }

    pub fn list(&self, field: ListField) -> Option<&[String]> {
        match field {
            ListField::Goals => self.goals.as_deref(),
            ListField::Constraints => self.constraints.as_deref(),
            ListField::Dependencies => self.dependencies.as_deref(),
            ListField::EdgeCases => self.edge_cases.as_deref(),
            ListField::AcceptanceCriteria => self.acceptance_criteria.as_deref(),
        }
    }
}

impl From<Analysis> for AnalysisEdits {
    fn from(analysis: Analysis) -> Self {
        Self {
            goals: Some(analysis.goals),
            constraints: Some(analysis.constraints),
            dependencies: Some(analysis.dependencies),
            edge_cases: Some(analysis.edge_cases),
            acceptance_criteria: Some(analysis.acceptance_criteria),
            questions: Some(analysis.questions),
            assumptions: Some(analysis.assumptions),
        }
    }
}
