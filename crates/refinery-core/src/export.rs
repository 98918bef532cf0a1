use chrono::{DateTime, Utc};
use refinery_analysis::{Analysis, RequirementForm};
use serde::{Deserialize, Serialize};

use crate::history::RequirementSession;
use crate::iteration::Iteration;

/// Read-only projection of the full iteration history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    pub exported_at: DateTime<Utc>,
    pub requirement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<RequirementForm>,
    pub total_iterations: usize,
    pub iterations: Vec<ExportedIteration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedIteration {
    pub iteration_number: usize,
    pub timestamp: DateTime<Utc>,
    pub is_user_satisfied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
    pub summary: String,
    pub analysis: Analysis,
}

impl From<&Iteration> for ExportedIteration {
    fn from(iteration: &Iteration) -> Self {
        Self {
            iteration_number: iteration.iteration_number,
            timestamp: iteration.timestamp,
            is_user_satisfied: iteration.is_user_satisfied,
            user_feedback: iteration.user_feedback.clone(),
            summary: iteration.summary(),
            analysis: iteration.analysis.clone(),
        }
    }
}

impl HistoryExport {
    pub fn new(session: &RequirementSession, iterations: &[Iteration]) -> Self {
        Self {
            exported_at: Utc::now(),
            requirement: session.requirement.clone(),
            form_data: session.form.clone(),
            total_iterations: iterations.len(),
            iterations: iterations.iter().map(ExportedIteration::from).collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
