pub const MIN_REQUIREMENT_CHARS: usize = 10;
pub const MAX_INPUT_CHARS: usize = 200_000;
pub const MIN_PROMPT_CHARS: usize = 10;
pub const MIN_INSTRUCTION_CHARS: usize = 5;

/// Check analysis input before any provider call. Returns every problem found.
pub fn validate_analysis_input(requirement: &str, context: Option<&str>) -> Vec<String> {
    let mut problems = Vec::new();

    let len = requirement.chars().count();
    if len < MIN_REQUIREMENT_CHARS {
        problems.push(format!(
            "Requirement must be at least {} characters",
            MIN_REQUIREMENT_CHARS
        ));
    } else if len > MAX_INPUT_CHARS {
        problems.push("Requirement must be less than 200k characters".to_string());
    }

    if context.is_some_and(|c| c.chars().count() > MAX_INPUT_CHARS) {
        problems.push("Context must be less than 200k characters".to_string());
    }

    problems
}

/// Check a prompt improvement request. Returns every problem found.
pub fn validate_improve_input(original_prompt: &str, instructions: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if original_prompt.chars().count() < MIN_PROMPT_CHARS {
        problems.push(format!(
            "Original prompt must be at least {} characters",
            MIN_PROMPT_CHARS
        ));
    }
    if instructions.chars().count() < MIN_INSTRUCTION_CHARS {
        problems.push(format!(
            "Improvement instructions must be at least {} characters",
            MIN_INSTRUCTION_CHARS
        ));
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_bounds() {
        assert_eq!(validate_analysis_input("too short", None).len(), 1);
        assert!(validate_analysis_input("exactly 10", None).is_empty());
        assert!(validate_analysis_input(&"x".repeat(MAX_INPUT_CHARS), None).is_empty());
        assert_eq!(
            validate_analysis_input(&"x".repeat(MAX_INPUT_CHARS + 1), None),
            vec!["Requirement must be less than 200k characters"]
        );
    }

    #[test]
    fn test_context_bound() {
        let context = "c".repeat(MAX_INPUT_CHARS + 1);
        let problems = validate_analysis_input("short", Some(&context));
        assert_eq!(problems.len(), 2);
        assert!(validate_analysis_input("a valid requirement", Some("")).is_empty());
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // 5 characters, 10 bytes
        assert_eq!(validate_analysis_input("ééééé", None).len(), 1);
    }

    #[test]
    fn test_improve_bounds() {
        assert!(validate_improve_input("Write the form", "Add tests").is_empty());
        assert_eq!(
            validate_improve_input("Too short", "Add"),
            vec![
                "Original prompt must be at least 10 characters",
                "Improvement instructions must be at least 5 characters",
            ]
        );
        assert!(validate_improve_input("exactly 10", "five!").is_empty());
    }
}
