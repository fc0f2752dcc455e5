use std::path::Path;

use serde::Deserialize;

use crate::domain::task::Task;
use crate::domain::validation::{Confidence, ValidationReport};
use crate::error::Result;
use crate::infrastructure::audit::{PromptKind, PromptLog};
use crate::ports::agent_provider::{AgentProvider, DispatchRequest};
use crate::ports::StateStore;

/// Interrogation is invoked when any criterion remains failing or
/// UNCERTAIN; it is capped at this many batched rounds.
pub const MAX_ROUNDS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum CriterionVerdict {
    Complete,
    Incomplete,
    Uncertain,
}

#[derive(Debug, Deserialize)]
struct VerdictEntry {
    criterion: String,
    verdict: CriterionVerdict,
    #[serde(default)]
    #[allow(dead_code)]
    evidence: String,
}

#[derive(Debug, Deserialize)]
struct VerdictResponse {
    #[serde(default)]
    verdicts: Vec<VerdictEntry>,
}

fn flag_key(task_id: &str, attempt: u32) -> String {
    format!("interrogation_performed_{task_id}_{attempt}")
}

fn build_prompt(unresolved: &[String]) -> String {
    format!(
        "# Interrogation\nThe following acceptance criteria are not yet confirmed:\n{}\n\n\
         For each, state either the file path that satisfies it or explicitly acknowledge it is not complete.",
        unresolved.join("\n")
    )
}

fn build_analysis_prompt(unresolved: &[String], raw_response: &str) -> String {
    format!(
        "# Interrogation analysis\nCriteria under review:\n{}\n\nAgent response to analyze:\n{raw_response}\n\n\
         Respond with {{\"verdicts\": [{{\"criterion\": string, \"verdict\": \"COMPLETE\"|\"INCOMPLETE\"|\"UNCERTAIN\", \"evidence\": string}}]}}.",
        unresolved.join("\n")
    )
}

/// Strategy 4: batched, bounded interrogation. Before the first round
/// the supervisor pre-persists a flag so a crash mid-interrogation
/// does not cause the whole exchange to restart from round one.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    task: &Task,
    mut report: ValidationReport,
    attempt: u32,
    helper: &dyn AgentProvider,
    working_directory: &Path,
    state_store: &dyn StateStore,
    prompt_log: &PromptLog,
    strict: bool,
) -> Result<ValidationReport> {
    let mut unresolved: Vec<String> = report.failed_criteria.iter().chain(report.uncertain_criteria.iter()).cloned().collect();
    if unresolved.is_empty() {
        return Ok(report);
    }

    let key = flag_key(&task.task_id, attempt);
    if state_store.get(&key).await?.is_none() {
        state_store.set(&key, "true".to_string()).await?;
    }

    let mut round = 0;
    while round < MAX_ROUNDS && !unresolved.is_empty() {
        round += 1;

        let prompt = build_prompt(&unresolved);
        prompt_log.append_best_effort(PromptKind::InterrogationPrompt, Some(&task.task_id), &prompt).await;
        let outcome = helper
            .dispatch(DispatchRequest {
                prompt,
                working_directory: working_directory.to_path_buf(),
                agent_mode: None,
                session_id: None,
                feature_id: None,
            })
            .await?;
        prompt_log.append_best_effort(PromptKind::InterrogationResponse, Some(&task.task_id), &outcome.parsed_output).await;

        let analysis_prompt = build_analysis_prompt(&unresolved, &outcome.parsed_output);
        let analysis = helper
            .dispatch(DispatchRequest {
                prompt: analysis_prompt,
                working_directory: working_directory.to_path_buf(),
                agent_mode: None,
                session_id: None,
                feature_id: None,
            })
            .await?;

        let verdicts: Vec<VerdictEntry> = serde_json::from_str::<VerdictResponse>(&analysis.parsed_output).map(|r| r.verdicts).unwrap_or_default();

        unresolved.retain(|criterion| {
            let verdict = verdicts.iter().find(|v| &v.criterion == criterion).map(|v| v.verdict);
            match verdict {
                Some(CriterionVerdict::Complete) => false,
                Some(CriterionVerdict::Incomplete) => true,
                Some(CriterionVerdict::Uncertain) | None => true,
            }
        });

        if strict && !unresolved.is_empty() {
            break;
        }
    }

    report.failed_criteria = unresolved.clone();
    report.uncertain_criteria = Vec::new();
    report.valid = unresolved.is_empty();
    if report.valid {
        report.confidence = Confidence::Medium;
        report.failure_reason = None;
    }
    Ok(report)
}
