//! JSON parsing helpers for model responses
//!
//! Models asked for JSON still sometimes wrap it in markdown fences, so the
//! text is cleaned before decoding.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::AnalysisResult;

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```json\n?|```").expect("valid regex"))
}

/// Remove markdown code fence markers and trim
pub fn strip_code_fences(text: &str) -> String {
    fence_pattern().replace_all(text, "").trim().to_string()
}

/// Decode the analysis JSON from raw response text
pub fn parse_analysis_response(text: &str) -> Result<AnalysisResult> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Err(Error::EmptyResponse);
    }
    serde_json::from_str(&cleaned).map_err(|e| {
        Error::Analysis(format!(
            "Invalid analysis JSON from AI: {} | Raw: {}",
            e,
            truncate_chars(&cleaned, 200)
        ))
    })
}

/// Truncate on a char boundary (responses are often non-ASCII)
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    const BODY: &str = r#"{"summary":"พบความผิดปกติ 1 รายการ","anomalies":[{"id":1,"actCode":"X1","monthly":"202401","amount":100000,"reason":"สูงผิดปกติ","severity":"High"}]}"#;

    #[test]
    fn test_strip_json_fence() {
        let text = format!("```json\n{}\n```", BODY);
        assert_eq!(strip_code_fences(&text), BODY);
    }

    #[test]
    fn test_strip_bare_fence() {
        let text = format!("```{}```", BODY);
        assert_eq!(strip_code_fences(&text), BODY);
    }

    #[test]
    fn test_strip_noop() {
        assert_eq!(strip_code_fences(&format!("  {}\n", BODY)), BODY);
    }

    #[test]
    fn test_parse_analysis_response() {
        let result = parse_analysis_response(&format!("```json\n{}\n```", BODY)).unwrap();
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].id, 1);
        assert_eq!(result.anomalies[0].severity, Severity::High);
        assert_eq!(result.anomalies[0].amount, 100000.0);
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_analysis_response("not json at all").unwrap_err();
        assert!(matches!(err, Error::Analysis(_)));
        assert!(err.to_string().contains("Invalid analysis JSON"));
    }

    #[test]
    fn test_parse_missing_field_is_schema_error() {
        let err = parse_analysis_response(r#"{"summary":"x"}"#).unwrap_err();
        assert!(matches!(err, Error::Analysis(_)));
    }

    #[test]
    fn test_parse_only_fences_is_empty() {
        let err = parse_analysis_response("```json\n```").unwrap_err();
        assert!(matches!(err, Error::EmptyResponse));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let thai = "ก".repeat(300);
        let out = truncate_chars(&thai, 200);
        assert_eq!(out.chars().count(), 203);
    }
}
