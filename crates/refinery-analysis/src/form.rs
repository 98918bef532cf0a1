use serde::{Deserialize, Serialize};

/// Structured intake details that accompany a free-text requirement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequirementForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub components: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<String>,
    pub reference_urls: Vec<String>,
    /// File names only; contents travel as context
    pub reference_files: Vec<String>,
}

impl RequirementForm {
    fn detail_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.extend(text_line("Task Type", &self.task_type));
        lines.extend(text_line("Goal", &self.goal));
        lines.extend(list_line("Components/Files Affected", &self.components));
        lines.extend(text_line("Expected Inputs", &self.inputs));
        lines.extend(text_line("Expected Outputs", &self.outputs));
        lines.extend(list_line("Reference URLs", &self.reference_urls));
        lines.extend(list_line("Reference Files", &self.reference_files));
        lines
    }

    /// Merge the form details into the free-text requirement
    pub fn structured_requirement(&self, requirement: &str) -> String {
        let lines = self.detail_lines();
        if lines.is_empty() {
            return requirement.to_string();
        }

        let details = lines.join("\n");
        if requirement.trim().is_empty() {
            details
        } else {
            format!("{}\n\nStructured Details:\n{}", requirement, details)
        }
    }
}

fn text_line(label: &str, value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| format!("{}: {}", label, v))
}

fn list_line(label: &str, values: &[String]) -> Option<String> {
    (!values.is_empty()).then(|| format!("{}: {}", label, values.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_form_keeps_requirement() {
        let form = RequirementForm::default();
        assert_eq!(form.structured_requirement("Build a CLI"), "Build a CLI");
    }

    #[test]
    fn test_details_are_appended_in_order() {
        let form = RequirementForm {
            task_type: Some("feature".into()),
            goal: Some("Faster login".into()),
            components: vec!["auth.rs".into(), "session.rs".into()],
            outputs: Some("JWT".into()),
            reference_files: vec!["spec.pdf".into()],
            ..Default::default()
        };

        let text = form.structured_requirement("Rework login");
        assert_eq!(
            text,
            "Rework login\n\nStructured Details:\nTask Type: feature\nGoal: Faster login\n\
             Components/Files Affected: auth.rs, session.rs\nExpected Outputs: JWT\n\
             Reference Files: spec.pdf"
        );
    }

    #[test]
    fn test_blank_requirement_returns_details_only() {
        let form = RequirementForm {
            goal: Some("Add search".into()),
            ..Default::default()
        };
        assert_eq!(form.structured_requirement("  "), "Goal: Add search");
    }
}
