use std::path::Path;

use regex::Regex;

use crate::domain::validation::{Confidence, FileCheck, RuleDescriptor, RuleCatalog, ValidationReport};

/// Strategy 2: criterion-by-criterion rule evaluation. Each acceptance
/// criterion is matched against the rule catalog via regex keyword
/// matches; a criterion passes iff every check of every matched rule
/// is satisfied. Criteria matching no rule are left uncertain rather
/// than silently passed.
#[must_use]
pub fn run(report_in: &ValidationReport, criteria: &[String], catalog: &RuleCatalog, working_directory: &Path) -> ValidationReport {
    let to_evaluate: Vec<&String> = if report_in.failed_criteria.is_empty() { criteria.iter().collect() } else { report_in.failed_criteria.iter().collect() };

    let mut passed = Vec::new();
    let mut failed = Vec::new();
    let mut uncertain = Vec::new();
    let mut worst = Confidence::High;

    for criterion in to_evaluate {
        let matched = matching_rules(criterion, catalog);
        if matched.is_empty() {
            uncertain.push(criterion.clone());
            worst = worst.min(Confidence::Uncertain);
            continue;
        }
        let all_satisfied = matched.iter().all(|rule| rule.checks.iter().all(|check| evaluate_check(check, working_directory)));
        if all_satisfied {
            passed.push(RuleDescriptor {
                criterion: criterion.clone(),
                description: format!("{} deterministic check(s) satisfied", matched.iter().map(|r| r.checks.len()).sum::<usize>()),
            });
            let rule_conf = matched.iter().map(|r| r.confidence).min().unwrap_or(Confidence::High);
            worst = worst.min(rule_conf);
        } else {
            failed.push(criterion.clone());
            worst = worst.min(Confidence::Low);
        }
    }

    let valid = failed.is_empty() && uncertain.is_empty();
    ValidationReport {
        valid,
        failure_reason: if valid {
            None
        } else {
            Some("one or more acceptance criteria unmet by deterministic checks".to_string())
        },
        passed_rules: passed,
        failed_rules: failed.iter().map(|c| RuleDescriptor { criterion: c.clone(), description: "deterministic check failed".into() }).collect(),
        confidence: if valid { worst } else { Confidence::Low },
        failed_criteria: failed,
        uncertain_criteria: uncertain,
    }
}

fn matching_rules<'a>(criterion: &str, catalog: &'a RuleCatalog) -> Vec<&'a crate::domain::validation::ValidationRule> {
    let lower = criterion.to_lowercase();
    catalog
        .iter()
        .filter(|rule| {
            rule.keywords.iter().any(|keyword| {
                Regex::new(&format!("(?i){keyword}"))
                    .map(|re| re.is_match(&lower))
                    .unwrap_or(false)
            })
        })
        .collect()
}

fn evaluate_check(check: &FileCheck, working_directory: &Path) -> bool {
    match check {
        FileCheck::FileExists { path, negate } => {
            let exists = working_directory.join(path).is_file();
            exists != *negate
        }
        FileCheck::DirectoryExists { path, negate } => {
            let exists = working_directory.join(path).is_dir();
            exists != *negate
        }
        FileCheck::JsonContains { path, field, value } => json_contains(working_directory, path, field, value),
        FileCheck::GrepFound { path, pattern } => grep(working_directory, path, pattern).unwrap_or(false),
        FileCheck::GrepNotFound { path, pattern } => !grep(working_directory, path, pattern).unwrap_or(true),
        FileCheck::FileCount { glob, min, max } => file_count(working_directory, glob, *min, *max),
    }
}

fn json_contains(working_directory: &Path, path: &str, field: &str, expected: &serde_json::Value) -> bool {
    let Ok(contents) = std::fs::read_to_string(working_directory.join(path)) else {
        return false;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&contents) else {
        return false;
    };
    let mut current = &value;
    for segment in field.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current == expected
}

fn grep(working_directory: &Path, path: &str, pattern: &str) -> Option<bool> {
    let contents = std::fs::read_to_string(working_directory.join(path)).ok()?;
    let re = Regex::new(pattern).ok()?;
    Some(re.is_match(&contents))
}

fn file_count(working_directory: &Path, glob_pattern: &str, min: Option<usize>, max: Option<usize>) -> bool {
    let pattern = working_directory.join(glob_pattern);
    let Some(pattern_str) = pattern.to_str() else { return false };
    let Ok(paths) = glob::glob(pattern_str) else { return false };
    let count = paths.filter_map(std::result::Result::ok).count();
    min.is_none_or(|m| count >= m) && max.is_none_or(|m| count <= m)
}
