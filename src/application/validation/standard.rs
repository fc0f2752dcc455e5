use std::path::Path;

use crate::domain::task::TaskType;
use crate::domain::validation::{Confidence, ValidationReport};

use super::response::{self, ParsedResponse};

/// Strategy 1: structural checks only. For behavioral and verification
/// tasks, a clean structural parse is itself a decisive outcome and
/// short-circuits the pipeline; for coding-family tasks, a structural
/// pass only clears the way for criterion-by-criterion evaluation in
/// the deterministic strategy — it never marks the task valid on its
/// own, since satisfying acceptance criteria is strictly stronger than
/// "the JSON shape was right."
#[must_use]
pub fn run(raw_response: &str, task_type: TaskType, working_directory: &Path) -> ValidationReport {
    let parsed = match response::parse(raw_response, task_type) {
        Ok(parsed) => parsed,
        Err(reason) => return ValidationReport::failing(reason, Confidence::Low),
    };

    match parsed {
        ParsedResponse::Behavioral(body) => {
            if body.status != "completed" {
                return ValidationReport::failing(format!("behavioral response status was {}", body.status), Confidence::Low);
            }
            let confidence = match body.confidence.to_uppercase().as_str() {
                "HIGH" => Confidence::High,
                "LOW" => Confidence::Low,
                _ => Confidence::Uncertain,
            };
            ValidationReport {
                valid: true,
                failure_reason: None,
                passed_rules: Vec::new(),
                failed_rules: Vec::new(),
                confidence,
                failed_criteria: Vec::new(),
                uncertain_criteria: Vec::new(),
            }
        }
        ParsedResponse::Verification(body) => {
            if body.verdict == "pass" {
                ValidationReport {
                    valid: true,
                    failure_reason: None,
                    passed_rules: Vec::new(),
                    failed_rules: Vec::new(),
                    confidence: Confidence::High,
                    failed_criteria: Vec::new(),
                    uncertain_criteria: Vec::new(),
                }
            } else {
                ValidationReport::failing(
                    format!("verification failed: {}", body.findings.join("; ")),
                    Confidence::High,
                )
            }
        }
        ParsedResponse::Coding(body) => {
            if body.status != "completed" {
                return ValidationReport::failing(format!("coding response status was {}", body.status), Confidence::Low);
            }
            let missing: Vec<String> = body
                .files_created
                .iter()
                .chain(body.files_updated.iter())
                .filter(|path| !working_directory.join(path).exists())
                .cloned()
                .collect();
            if !missing.is_empty() {
                let mut report = ValidationReport::failing(format!("declared files do not exist: {}", missing.join(", ")), Confidence::Low);
                report.failed_criteria = missing;
                return report;
            }
            ValidationReport::failing("structural checks passed; awaiting criterion evaluation", Confidence::Low)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_json() {
        let report = run("not json", TaskType::Coding, Path::new("/tmp"));
        assert!(!report.valid);
    }

    #[test]
    fn verification_pass_is_decisive() {
        let raw = r#"{"status":"completed","findings":[],"verdict":"pass","reasoning":"x"}"#;
        let report = run(raw, TaskType::Verification, Path::new("/tmp"));
        assert!(report.valid);
        assert_eq!(report.confidence, Confidence::High);
    }

    #[test]
    fn coding_never_shortcircuits_even_with_clean_structure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("utils.ts"), "x").unwrap();
        let raw = r#"{"status":"completed","files_created":["utils.ts"],"files_updated":[],"changes":[],"neededChanges":false,"reasoning":"x","summary":"y"}"#;
        let report = run(raw, TaskType::Coding, dir.path());
        assert!(!report.valid);
    }

    #[test]
    fn coding_flags_missing_declared_files() {
        let dir = tempfile::tempdir().unwrap();
        let raw = r#"{"status":"completed","files_created":["missing.ts"],"files_updated":[],"changes":[],"neededChanges":false,"reasoning":"x","summary":"y"}"#;
        let report = run(raw, TaskType::Coding, dir.path());
        assert!(!report.valid);
        assert_eq!(report.failed_criteria, vec!["missing.ts".to_string()]);
    }
}
