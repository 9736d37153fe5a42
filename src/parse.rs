use serde::de::DeserializeOwned;

use crate::error::{LabAssistError, Result};

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse a model reply into `T`, tolerating a code fence around the JSON.
pub fn parse_structured<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    let text = strip_fences(raw);
    if text.is_empty() {
        return Err(LabAssistError::SchemaViolation(format!(
            "empty response for {what}"
        )));
    }
    serde_json::from_str(text).map_err(|e| {
        tracing::warn!("Failed to parse {} response: {}", what, e);
        LabAssistError::SchemaViolation(format!("failed to parse {what}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyTrend;

    #[test]
    fn test_strip_fences_variants() {
        assert_eq!(strip_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_fences("  ```\n{}\n```  "), "{}");
        assert_eq!(strip_fences("```json[2]```"), "[2]");
        assert_eq!(strip_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_structured_reports_schema_violation() {
        let err = parse_structured::<Vec<DailyTrend>>("```json\nnot json\n```", "trends")
            .expect_err("garbage should not parse");
        assert!(matches!(err, LabAssistError::SchemaViolation(_)));

        let err = parse_structured::<Vec<DailyTrend>>("   ", "trends")
            .expect_err("empty should not parse");
        assert!(matches!(err, LabAssistError::SchemaViolation(_)));
    }

    #[test]
    fn test_parse_structured_fenced_document() {
        let trends: Vec<DailyTrend> = parse_structured(
            "```json\n[{\"title\":\"t\",\"summary\":\"s\"}]\n```",
            "trends",
        )
        .expect("fenced JSON should parse");
        assert_eq!(trends[0].title, "t");
    }
}
