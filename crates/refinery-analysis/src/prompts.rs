use crate::model::{Analysis, AnalysisEdits, ListField, Question};

/// JSON shape requested from the model for a full analysis
pub const ANALYSIS_SCHEMA: &str = r#"{
  "goals": ["string"],
  "constraints": ["string"],
  "dependencies": ["string"],
  "edgeCases": ["string"],
  "acceptanceCriteria": ["string"],
  "questions": [{"id": "string", "text": "string", "priority": "critical|important|nice-to-have"}],
  "assumptions": [{"id": "string", "text": "string", "confidence": 0.0, "accepted": true}]
}"#;

/// JSON shape requested for follow-up questions
pub const QUESTIONS_SCHEMA: &str =
    r#"{"questions":[{"id":"string","text":"string","priority":"critical|important|nice-to-have"}]}"#;

/// Context above this many characters is summarized before use
pub const CONTEXT_SUMMARY_THRESHOLD: usize = 16_000;

/// Inputs for the iteration prompt
pub struct IterationPromptInput<'a> {
    pub requirement: &'a str,
    pub context: &'a str,
    pub previous: &'a Analysis,
    pub previous_number: usize,
    pub iteration_number: usize,
    pub user_edits: Option<&'a AnalysisEdits>,
    pub user_feedback: Option<&'a str>,
}

/// Prompt templates for requirement analysis
pub struct AnalysisPrompts;

impl AnalysisPrompts {
    /// Build the first-pass analysis prompt
    pub fn build_analysis_prompt(requirement: &str, context: &str) -> String {
        format!(
            r#"You are an expert software architect and requirements analyst.

Break the requirement below into goals, constraints, dependencies, edge cases and acceptance criteria. Raise clarifying questions where the requirement is ambiguous, ranked by priority, and state the assumptions you are making with a confidence between 0 and 1.

REQUIREMENT:
{requirement}

CONTEXT:
{context}

SCHEMA:
{schema}

Respond with valid JSON only, matching the schema exactly."#,
            requirement = requirement,
            context = context_or_none(context),
            schema = ANALYSIS_SCHEMA,
        )
    }

    /// Build the refinement prompt for the next iteration
    pub fn build_iteration_prompt(input: &IterationPromptInput<'_>) -> String {
        let edits = input
            .user_edits
            .map(format_edits)
            .filter(|e| !e.is_empty())
            .map(|e| format!("\n\nUSER EDITS:\n{}", e))
            .unwrap_or_default();

        let feedback = input
            .user_feedback
            .filter(|f| !f.trim().is_empty())
            .map(|f| format!("\n\nUSER FEEDBACK:\n{}", f))
            .unwrap_or_default();

        format!(
            r#"You are an expert software architect and requirements analyst.

This is ITERATION {iteration} of an analysis refinement process. Create an improved analysis based on:
1. The original requirement
2. Previous analysis results
3. User edits and feedback
4. Context information

Focus on:
- Incorporating user feedback and edits
- Addressing gaps or issues from the previous iteration
- Adding new insights while preserving valuable previous work
- Generating better questions and assumptions

ORIGINAL REQUIREMENT:
{requirement}

CONTEXT:
{context}

PREVIOUS ANALYSIS (Iteration {previous_number}):
{previous}{edits}{feedback}

SCHEMA:
{schema}

Respond with valid JSON only, matching the schema exactly. Make this iteration meaningfully better than the previous one."#,
            iteration = input.iteration_number,
            requirement = input.requirement,
            context = context_or_none(input.context),
            previous_number = input.previous_number,
            previous = format_previous(input.previous),
            edits = edits,
            feedback = feedback,
            schema = ANALYSIS_SCHEMA,
        )
    }

    /// Build the prompt that condenses oversized context
    pub fn build_summarization_prompt(context: &str) -> String {
        format!(
            r#"You are an expert software architect. Summarize the following repository or product documentation into a concise implementation context.

Focus on:
- Primary goals and user-facing features
- Tech stack, architecture notes, key modules
- APIs/endpoints, data models, integrations
- Constraints, non-functional requirements, security/compliance
- Notable edge cases and assumptions

Write a clear, structured brief in under 2500 words. Preserve important details; omit marketing fluff.

INPUT CONTEXT:
{context}"#,
            context = context,
        )
    }

    /// Build the prompt asking for follow-up questions
    pub fn build_additional_questions_prompt(
        requirement: &str,
        current: &Analysis,
        answered: &[Question],
    ) -> String {
        let answered_text = answered
            .iter()
            .filter(|q| q.is_answered())
            .map(|q| format!("Q: {}\nA: {}", q.text, q.answer.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            r#"You are an expert software architect and requirements analyst.

Generate additional clarifying questions for the given requirement based on the current analysis and already answered questions.

REQUIREMENT:
{requirement}

CURRENT ANALYSIS:
Goals: {goals}
Constraints: {constraints}
Dependencies: {dependencies}

ANSWERED QUESTIONS:
{answered}

SCHEMA:
{schema}

Respond with valid JSON only, matching the schema exactly."#,
            requirement = requirement,
            goals = current.goals.join(", "),
            constraints = current.constraints.join(", "),
            dependencies = current.dependencies.join(", "),
            answered = answered_text,
            schema = QUESTIONS_SCHEMA,
        )
    }
}

fn context_or_none(context: &str) -> &str {
    if context.trim().is_empty() {
        "(none provided)"
    } else {
        context
    }
}

fn format_previous(analysis: &Analysis) -> String {
    let mut lines: Vec<String> = ListField::ALL
        .iter()
        .map(|f| format!("{}: {}", f.label(), analysis.list(*f).join(", ")))
        .collect();

    let questions = analysis
        .questions
        .iter()
        .map(|q| match q.answer.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(answer) => format!("{} (Answered: {})", q.text, answer),
            None => format!("{} (Unanswered)", q.text),
        })
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("Questions: {}", questions));

    let assumptions = analysis
        .assumptions
        .iter()
        .map(|a| {
            format!(
                "{} ({}, Confidence: {:.0}%)",
                a.text,
                if a.accepted { "Accepted" } else { "Rejected" },
                a.confidence * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("Assumptions: {}", assumptions));

    lines.join("\n")
}

fn format_edits(edits: &AnalysisEdits) -> String {
    let mut lines: Vec<String> = ListField::ALL
        .iter()
        .filter_map(|f| {
            edits
                .list(*f)
                .map(|values| format!("{}: {}", f.label(), values.join(", ")))
        })
        .collect();

    if let Some(ref questions) = edits.questions {
        let texts: Vec<&str> = questions.iter().map(|q| q.text.as_str()).collect();
        lines.push(format!("Questions: {}", texts.join(", ")));
    }
    if let Some(ref assumptions) = edits.assumptions {
        let texts: Vec<&str> = assumptions.iter().map(|a| a.text.as_str()).collect();
        lines.push(format!("Assumptions: {}", texts.join(", ")));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assumption, Priority};

    fn previous() -> Analysis {
        let mut answered = Question::new("q1", "Which DB?", Priority::Critical);
        answered.answer = Some("Postgres".into());
        Analysis {
            goals: vec!["Login".into(), "Logout".into()],
            questions: vec![answered, Question::new("q2", "SSO?", Priority::Important)],
            assumptions: vec![Assumption::new("a1", "Web only", 0.75)],
            ..Default::default()
        }
    }

    #[test]
    fn test_iteration_prompt_includes_history() {
        let prev = previous();
        let edits = AnalysisEdits {
            goals: Some(vec!["Login".into(), "MFA".into()]),
            ..Default::default()
        };
        let prompt = AnalysisPrompts::build_iteration_prompt(&IterationPromptInput {
            requirement: "Auth system",
            context: "",
            previous: &prev,
            previous_number: 2,
            iteration_number: 3,
            user_edits: Some(&edits),
            user_feedback: Some("Focus on security"),
        });

        assert!(prompt.contains("ITERATION 3"));
        assert!(prompt.contains("PREVIOUS ANALYSIS (Iteration 2)"));
        assert!(prompt.contains("Goals: Login, Logout"));
        assert!(prompt.contains("Which DB? (Answered: Postgres)"));
        assert!(prompt.contains("SSO? (Unanswered)"));
        assert!(prompt.contains("Web only (Accepted, Confidence: 75%)"));
        assert!(prompt.contains("USER EDITS:\nGoals: Login, MFA"));
        assert!(prompt.contains("USER FEEDBACK:\nFocus on security"));
        assert!(prompt.contains("(none provided)"));
    }

    #[test]
    fn test_iteration_prompt_omits_absent_sections() {
        let prev = previous();
        let prompt = AnalysisPrompts::build_iteration_prompt(&IterationPromptInput {
            requirement: "Auth system",
            context: "Rust backend",
            previous: &prev,
            previous_number: 1,
            iteration_number: 2,
            user_edits: Some(&AnalysisEdits::default()),
            user_feedback: Some("   "),
        });

        assert!(!prompt.contains("USER EDITS"));
        assert!(!prompt.contains("USER FEEDBACK"));
        assert!(prompt.contains("Rust backend"));
    }

    #[test]
    fn test_additional_questions_prompt_lists_answers() {
        let prev = previous();
        let prompt =
            AnalysisPrompts::build_additional_questions_prompt("Auth", &prev, &prev.questions);
        assert!(prompt.contains("Q: Which DB?\nA: Postgres"));
        assert!(!prompt.contains("Q: SSO?"));
    }
}
