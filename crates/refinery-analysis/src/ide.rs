//! Coding-assistant prompts built from a finished analysis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::form::RequirementForm;
use crate::model::{Analysis, Assumption, Question};

/// Coding assistants that get a tailored prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeKind {
    Cursor,
    Copilot,
    Warp,
    Windsurf,
}

impl IdeKind {
    pub const ALL: [IdeKind; 4] = [
        IdeKind::Cursor,
        IdeKind::Copilot,
        IdeKind::Warp,
        IdeKind::Windsurf,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            IdeKind::Cursor => "Cursor IDE",
            IdeKind::Copilot => "GitHub Copilot",
            IdeKind::Warp => "Warp terminal",
            IdeKind::Windsurf => "Windsurf IDE",
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            IdeKind::Cursor => "Cursor",
            IdeKind::Copilot => "Copilot",
            IdeKind::Warp => "Warp",
            IdeKind::Windsurf => "Windsurf",
        }
    }
}

impl std::fmt::Display for IdeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdeKind::Cursor => write!(f, "cursor"),
            IdeKind::Copilot => write!(f, "copilot"),
            IdeKind::Warp => write!(f, "warp"),
            IdeKind::Windsurf => write!(f, "windsurf"),
        }
    }
}

impl std::str::FromStr for IdeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cursor" => Ok(IdeKind::Cursor),
            "copilot" | "github-copilot" => Ok(IdeKind::Copilot),
            "warp" => Ok(IdeKind::Warp),
            "windsurf" => Ok(IdeKind::Windsurf),
            _ => Err(format!("Unknown IDE: {}", s)),
        }
    }
}

/// One generated prompt per supported assistant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPrompts {
    pub cursor: String,
    pub copilot: String,
    pub warp: String,
    pub windsurf: String,
}

impl GeneratedPrompts {
    pub fn get(&self, ide: IdeKind) -> &str {
        match ide {
            IdeKind::Cursor => &self.cursor,
            IdeKind::Copilot => &self.copilot,
            IdeKind::Warp => &self.warp,
            IdeKind::Windsurf => &self.windsurf,
        }
    }

    pub fn get_mut(&mut self, ide: IdeKind) -> &mut String {
        match ide {
            IdeKind::Cursor => &mut self.cursor,
            IdeKind::Copilot => &mut self.copilot,
            IdeKind::Warp => &mut self.warp,
            IdeKind::Windsurf => &mut self.windsurf,
        }
    }
}

/// Manual or improved replacements, keyed by assistant. An entry shadows the
/// generated prompt for that assistant.
pub type EditedPrompts = BTreeMap<IdeKind, String>;

/// What every assistant prompt is built from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptInput {
    /// Already merged with any structured form details
    pub requirement: String,
    pub analysis: Analysis,
    pub answered_questions: Vec<Question>,
    pub accepted_assumptions: Vec<Assumption>,
}

impl PromptInput {
    /// Take the answered questions and accepted assumptions from the analysis itself
    pub fn from_analysis(requirement: impl Into<String>, analysis: Analysis) -> Self {
        let answered_questions = analysis.questions.clone();
        let accepted_assumptions = analysis.assumptions.clone();
        Self {
            requirement: requirement.into(),
            analysis,
            answered_questions,
            accepted_assumptions,
        }
    }

    /// Merge structured form details into the requirement
    pub fn with_form(mut self, form: Option<&RequirementForm>) -> Self {
        if let Some(form) = form {
            self.requirement = form.structured_requirement(&self.requirement);
        }
        self
    }

    fn relevant_questions(&self) -> impl Iterator<Item = &Question> {
        self.answered_questions.iter().filter(|q| q.is_answered())
    }

    fn relevant_assumptions(&self) -> impl Iterator<Item = &Assumption> {
        self.accepted_assumptions.iter().filter(|a| a.accepted)
    }
}

const CODE_QUALITY_INSTRUCTION: &str = "The generated code must be production quality: \
follow the project's existing conventions, handle errors explicitly, keep functions small, \
and include tests for the acceptance criteria.";

/// Prompt templates for coding-assistant prompts
pub struct IdePrompts;

impl IdePrompts {
    /// Ask the model to write a prompt tailored to one assistant
    pub fn build_ide_prompt(ide: IdeKind, input: &PromptInput) -> String {
        // Cursor gets assumption confidence; the others only the text
        let with_confidence = ide == IdeKind::Cursor;
        let name = ide.short_name();

        format!(
            r#"Create a {display} prompt optimized for code generation. {name} works best with concise, specific instructions and clear technical requirements.

{quality}

{analysis}

Generate a {name}-optimized prompt that includes:
1. Concise goal statement
2. Technical specifications
3. Implementation steps
4. Key constraints and requirements
5. Expected behavior description
6. Code generation guidance

Format as a direct, actionable prompt that will help {name} generate accurate code suggestions. Keep it focused and specific."#,
            display = ide.display_name(),
            name = name,
            quality = CODE_QUALITY_INSTRUCTION,
            analysis = analysis_section(input, with_confidence),
        )
    }

    /// Prompt for an assistant outside the supported set
    pub fn build_custom_prompt(ide_name: &str, input: &PromptInput) -> String {
        format!(
            r#"Create a prompt optimized for {ide} for implementing the following feature.

{quality}

{analysis}

Generate a prompt tailored for {ide} that includes:
1. Clear objective
2. Technical specifications
3. Implementation guidance
4. Best practices for {ide}
5. Expected deliverables

Format the response appropriately for {ide}'s workflow and capabilities."#,
            ide = ide_name,
            quality = CODE_QUALITY_INSTRUCTION,
            analysis = analysis_section(input, false),
        )
    }

    /// Rewrite an existing prompt according to the user's instructions
    pub fn build_improve_prompt(
        original: &str,
        ide: IdeKind,
        instructions: &str,
        context: Option<(&str, &Analysis)>,
    ) -> String {
        let context = context
            .map(|(requirement, analysis)| {
                format!(
                    "\n\nORIGINAL CONTEXT:\nRequirement: {}\nGoals: {}\nConstraints: {}\nDependencies: {}",
                    requirement,
                    analysis.goals.join(", "),
                    analysis.constraints.join(", "),
                    analysis.dependencies.join(", ")
                )
            })
            .unwrap_or_default();

        format!(
            r#"Improve the following {ide} prompt based on the user's feedback and instructions.

ORIGINAL PROMPT:
{original}

USER IMPROVEMENT INSTRUCTIONS:
{instructions}{context}

Generate an improved version of the prompt that:
1. Addresses the user's specific feedback
2. Maintains the original intent and structure
3. Enhances clarity and effectiveness
4. Remains optimized for {ide}
5. Incorporates best practices for prompt engineering

Return only the improved prompt without additional commentary."#,
            ide = ide.display_name(),
            original = original,
            instructions = instructions,
            context = context,
        )
    }
}

fn analysis_section(input: &PromptInput, with_confidence: bool) -> String {
    let analysis = &input.analysis;
    let mut section = format!(
        "ORIGINAL REQUIREMENT:\n{}\n\nANALYSIS RESULTS:\n\
         • Goals: {}\n• Constraints: {}\n• Dependencies: {}\n• Edge Cases: {}\n• Acceptance Criteria: {}",
        input.requirement,
        analysis.goals.join(", "),
        analysis.constraints.join(", "),
        analysis.dependencies.join(", "),
        analysis.edge_cases.join(", "),
        analysis.acceptance_criteria.join(", "),
    );

    let clarifications: Vec<String> = input
        .relevant_questions()
        .map(|q| format!("Q: {}\nA: {}", q.text, q.answer.as_deref().unwrap_or_default()))
        .collect();
    if !clarifications.is_empty() {
        section.push_str("\n\nCLARIFICATIONS:\n");
        section.push_str(&clarifications.join("\n\n"));
    }

    let assumptions: Vec<String> = input
        .relevant_assumptions()
        .map(|a| {
            if with_confidence {
                format!("- {} ({:.0}% confidence)", a.text, a.confidence * 100.0)
            } else {
                format!("- {}", a.text)
            }
        })
        .collect();
    if !assumptions.is_empty() {
        section.push_str("\n\nACCEPTED ASSUMPTIONS:\n");
        section.push_str(&assumptions.join("\n"));
    }

    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    fn input() -> PromptInput {
        let mut answered = Question::new("q1", "Which DB?", Priority::Critical);
        answered.answer = Some("Postgres".into());
        let mut rejected = Assumption::new("a2", "Mobile first", 0.4);
        rejected.accepted = false;

        PromptInput::from_analysis(
            "Build a login page",
            Analysis {
                goals: vec!["Login".into(), "Logout".into()],
                edge_cases: vec!["Expired session".into()],
                questions: vec![answered, Question::new("q2", "SSO?", Priority::Important)],
                assumptions: vec![Assumption::new("a1", "Web only", 0.75), rejected],
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_ide_prompt_carries_analysis() {
        let prompt = IdePrompts::build_ide_prompt(IdeKind::Copilot, &input());

        assert!(prompt.starts_with("Create a GitHub Copilot prompt"));
        assert!(prompt.contains("ORIGINAL REQUIREMENT:\nBuild a login page"));
        assert!(prompt.contains("• Goals: Login, Logout"));
        assert!(prompt.contains("• Edge Cases: Expired session"));
        assert!(prompt.contains("CLARIFICATIONS:\nQ: Which DB?\nA: Postgres"));
        assert!(!prompt.contains("SSO?"));
        assert!(prompt.contains("ACCEPTED ASSUMPTIONS:\n- Web only"));
        assert!(!prompt.contains("Mobile first"));
        assert!(!prompt.contains("75%"));
    }

    #[test]
    fn test_cursor_prompt_includes_confidence() {
        let prompt = IdePrompts::build_ide_prompt(IdeKind::Cursor, &input());
        assert!(prompt.contains("- Web only (75% confidence)"));
    }

    #[test]
    fn test_sections_are_omitted_when_empty() {
        let input = PromptInput::from_analysis("Build a login page", Analysis::default());
        let prompt = IdePrompts::build_custom_prompt("Zed", &input);

        assert!(prompt.contains("optimized for Zed"));
        assert!(!prompt.contains("CLARIFICATIONS"));
        assert!(!prompt.contains("ACCEPTED ASSUMPTIONS"));
    }

    #[test]
    fn test_improve_prompt_context_is_optional() {
        let analysis = input().analysis;
        let with = IdePrompts::build_improve_prompt(
            "Write the login form",
            IdeKind::Windsurf,
            "Mention rate limiting",
            Some(("Build a login page", &analysis)),
        );
        assert!(with.contains("ORIGINAL PROMPT:\nWrite the login form"));
        assert!(with.contains("USER IMPROVEMENT INSTRUCTIONS:\nMention rate limiting"));
        assert!(with.contains("ORIGINAL CONTEXT:\nRequirement: Build a login page\nGoals: Login, Logout"));
        assert!(with.contains("Remains optimized for Windsurf IDE"));

        let without = IdePrompts::build_improve_prompt(
            "Write the login form",
            IdeKind::Warp,
            "Shorter",
            None,
        );
        assert!(!without.contains("ORIGINAL CONTEXT"));
    }

    #[test]
    fn test_ide_kind_parsing() {
        assert_eq!("Cursor".parse::<IdeKind>().unwrap(), IdeKind::Cursor);
        assert_eq!("github-copilot".parse::<IdeKind>().unwrap(), IdeKind::Copilot);
        assert!("zed".parse::<IdeKind>().is_err());
        assert_eq!(
            serde_json::to_string(&IdeKind::Windsurf).unwrap(),
            "\"windsurf\""
        );
    }
}