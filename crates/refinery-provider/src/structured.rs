use tracing::debug;

use crate::ProviderError;

/// Append the JSON-only instruction to a prompt
pub fn structured_prompt(prompt: &str, schema: Option<&str>) -> String {
    match schema {
        Some(schema) => format!(
            "{}\n\nRespond with valid JSON that matches this schema exactly: {}",
            prompt, schema
        ),
        None => format!("{}\n\nRespond with valid JSON only, no additional text.", prompt),
    }
}

/// Parse a model reply as JSON.
///
/// Models often wrap the object in prose or a fenced block, so when the whole
/// reply does not parse, the outermost `{...}` span is tried before giving up.
pub fn parse_json_response(response: &str) -> Result<serde_json::Value, ProviderError> {
    if let Ok(value) = serde_json::from_str(response.trim()) {
        return Ok(value);
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            let candidate = &response[start..=end];
            debug!(len = candidate.len(), "Extracted JSON object from response");
            serde_json::from_str(candidate)
                .map_err(|e| ProviderError::Parse(format!("Failed to parse structured response: {}", e)))
        }
        _ => Err(ProviderError::Parse("Invalid JSON response".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let value = parse_json_response(r#"{"goals": ["a"]}"#).unwrap();
        assert_eq!(value["goals"][0], "a");
    }

    #[test]
    fn extracts_json_from_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"goals\": [\"a\", \"b\"]}\n```\nThanks";
        let value = parse_json_response(reply).unwrap();
        assert_eq!(value["goals"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn rejects_replies_without_json() {
        let err = parse_json_response("I cannot help with that.").unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn rejects_broken_json_span() {
        let err = parse_json_response("{\"goals\": [}").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn schema_is_embedded_in_prompt() {
        let prompt = structured_prompt("Analyze", Some("{\"goals\":[\"string\"]}"));
        assert!(prompt.starts_with("Analyze"));
        assert!(prompt.contains("matches this schema exactly"));
        assert!(structured_prompt("Analyze", None).ends_with("no additional text."));
    }
}
