use serde::{Deserialize, Serialize};

/// The supervisor's own rating of how reliable a validation outcome is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Uncertain,
    Low,
    Medium,
    High,
}

/// A descriptor of one passed or failed rule evaluation, kept for the
/// audit trail and operator-facing `status`/`metrics` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub criterion: String,
    pub description: String,
}

/// The output of the four-strategy validation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub passed_rules: Vec<RuleDescriptor>,
    #[serde(default)]
    pub failed_rules: Vec<RuleDescriptor>,
    pub confidence: Confidence,
    #[serde(default)]
    pub failed_criteria: Vec<String>,
    #[serde(default)]
    pub uncertain_criteria: Vec<String>,
}

impl ValidationReport {
    /// A criterion list of length 0 is trivially HIGH-confidence valid.
    #[must_use]
    pub fn trivial_pass() -> Self {
        Self {
            valid: true,
            failure_reason: None,
            passed_rules: Vec::new(),
            failed_rules: Vec::new(),
            confidence: Confidence::High,
            failed_criteria: Vec::new(),
            uncertain_criteria: Vec::new(),
        }
    }

    #[must_use]
    pub fn failing(reason: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            valid: false,
            failure_reason: Some(reason.into()),
            passed_rules: Vec::new(),
            failed_rules: Vec::new(),
            confidence,
            failed_criteria: Vec::new(),
            uncertain_criteria: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        !self.valid && self.confidence == Confidence::Uncertain && self.uncertain_criteria.is_empty() && self.failed_criteria.is_empty()
    }

    /// The validation reason used for repeated-identical-failure
    /// detection: falls back to a stable placeholder so two failures
    /// with no reason are still considered identical.
    #[must_use]
    pub fn reason_key(&self) -> &str {
        self.failure_reason.as_deref().unwrap_or("<no reason>")
    }
}

/// One of the six pure, side-effect-free file-system checks a matched
/// rule can run. `negate` flips existence checks so a rule can require
/// a path's *absence*.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum FileCheck {
    FileExists {
        path: String,
        #[serde(default)]
        negate: bool,
    },
    DirectoryExists {
        path: String,
        #[serde(default)]
        negate: bool,
    },
    JsonContains {
        path: String,
        field: String,
        value: serde_json::Value,
    },
    GrepFound {
        path: String,
        pattern: String,
    },
    GrepNotFound {
        path: String,
        pattern: String,
    },
    FileCount {
        glob: String,
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
}

/// A rule matched against an acceptance criterion via regex keyword
/// matching; satisfied iff every one of its checks passes. The rule's
/// confidence tag propagates to the criterion's confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Regex patterns; a rule matches a criterion if any pattern finds
    /// a match in the criterion text.
    pub keywords: Vec<String>,
    pub checks: Vec<FileCheck>,
    pub confidence: Confidence,
}

pub type RuleCatalog = Vec<ValidationRule>;

/// A small, generic catalog usable out of the box, covering
/// conventions that hold across most projects rather than any
/// project's domain rules: README/license/ignore-file presence and a
/// non-empty test suite. Operators with project-specific criteria
/// supply their own catalog via `Config.rule_catalog_path`.
#[must_use]
pub fn default_catalog() -> RuleCatalog {
    vec![
        ValidationRule {
            keywords: vec!["readme".to_string()],
            checks: vec![FileCheck::FileExists { path: "README.md".to_string(), negate: false }],
            confidence: Confidence::High,
        },
        ValidationRule {
            keywords: vec!["license".to_string(), "licence".to_string()],
            checks: vec![FileCheck::FileExists { path: "LICENSE".to_string(), negate: false }],
            confidence: Confidence::High,
        },
        ValidationRule {
            keywords: vec!["gitignore".to_string()],
            checks: vec![FileCheck::FileExists { path: ".gitignore".to_string(), negate: false }],
            confidence: Confidence::High,
        },
        ValidationRule {
            keywords: vec!["tests? (pass|added|exist)".to_string(), "test suite".to_string()],
            checks: vec![FileCheck::FileCount { glob: "tests/**/*".to_string(), min: Some(1), max: None }],
            confidence: Confidence::Medium,
        },
    ]
}
