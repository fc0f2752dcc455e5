//! The agent's response modeled as a tagged variant: the parser
//! branches once on task type and every downstream consumer works with
//! a typed value instead of re-inspecting raw JSON.

use serde::Deserialize;

use crate::domain::task::TaskType;

#[derive(Debug, Clone, Deserialize)]
pub struct CodingResponse {
    pub status: String,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_updated: Vec<String>,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default, rename = "neededChanges")]
    pub needed_changes: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BehavioralResponse {
    pub status: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationResponse {
    pub status: String,
    #[serde(default)]
    pub findings: Vec<String>,
    pub verdict: String,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone)]
pub enum ParsedResponse {
    Coding(CodingResponse),
    Behavioral(BehavioralResponse),
    Verification(VerificationResponse),
}

/// Parses the raw agent output against the JSON contract selected by
/// `task_type`. Returns `Err` with a human-readable reason on any
/// structural mismatch — required-field and enum-domain checks included.
pub fn parse(raw: &str, task_type: TaskType) -> Result<ParsedResponse, String> {
    match task_type {
        TaskType::Behavioral => {
            let parsed: BehavioralResponse = serde_json::from_str(raw).map_err(|e| format!("response did not match behavioral contract: {e}"))?;
            Ok(ParsedResponse::Behavioral(parsed))
        }
        TaskType::Verification => {
            let parsed: VerificationResponse = serde_json::from_str(raw).map_err(|e| format!("response did not match verification contract: {e}"))?;
            if parsed.verdict != "pass" && parsed.verdict != "fail" {
                return Err(format!("verdict must be pass or fail, got {}", parsed.verdict));
            }
            Ok(ParsedResponse::Verification(parsed))
        }
        _ => {
            let parsed: CodingResponse = serde_json::from_str(raw).map_err(|e| format!("response did not match coding-family contract: {e}"))?;
            Ok(ParsedResponse::Coding(parsed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coding_response() {
        let raw = r#"{"status":"completed","files_created":["src/utils.ts"],"files_updated":[],"changes":["src/utils.ts"],"neededChanges":true,"reasoning":"x","summary":"y"}"#;
        let parsed = parse(raw, TaskType::Coding).unwrap();
        assert!(matches!(parsed, ParsedResponse::Coding(_)));
    }

    #[test]
    fn rejects_invalid_verification_verdict() {
        let raw = r#"{"status":"completed","findings":[],"verdict":"maybe","reasoning":"x"}"#;
        assert!(parse(raw, TaskType::Verification).is_err());
    }
}
