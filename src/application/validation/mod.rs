//! The four-strategy validation pipeline: standard → deterministic →
//! helper-agent → interrogation. Modeled as an explicit ordered
//! pipeline of stages over a shared `ValidationReport`, not a
//! cross-calling class hierarchy — each stage takes the prior report
//! and returns a refined one; there is no recursion.

pub mod deterministic;
pub mod helper_agent;
pub mod interrogation;
pub mod response;
pub mod standard;

use std::path::Path;
use std::sync::Arc;

use crate::domain::task::Task;
use crate::domain::validation::{Confidence, RuleCatalog, ValidationReport};
use crate::error::Result;
use crate::infrastructure::audit::PromptLog;
use crate::ports::agent_provider::AgentProvider;
use crate::ports::StateStore;

/// Everything the pipeline needs beyond (task, raw agent response):
/// injected collaborators, never module-level singletons.
pub struct ValidationContext<'a> {
    pub working_directory: &'a Path,
    pub rule_catalog: &'a RuleCatalog,
    pub helper_agent: Option<Arc<dyn AgentProvider>>,
    pub prompt_log: &'a PromptLog,
    pub state_store: Arc<dyn StateStore>,
    /// When set (repeated-identical-failure detection triggered the
    /// "strict" mode), the helper-agent strategy is skipped and
    /// interrogation only resolves when every criterion comes back
    /// COMPLETE.
    pub strict: bool,
}

/// Runs the bounded pipeline for one dispatch outcome and returns the
/// final report. A criterion list of length 0 is trivially a
/// HIGH-confidence pass and skips the pipeline entirely.
pub async fn run_pipeline(task: &Task, attempt: u32, raw_response: &str, ctx: &ValidationContext<'_>) -> Result<ValidationReport> {
    if task.acceptance_criteria.is_empty() {
        return Ok(ValidationReport::trivial_pass());
    }

    let task_type = task.effective_task_type();
    let report = standard::run(raw_response, task_type, ctx.working_directory);
    if report.valid {
        return Ok(report);
    }

    let report = deterministic::run(&report, &task.acceptance_criteria, ctx.rule_catalog, ctx.working_directory);
    if report.valid {
        return Ok(report);
    }

    let report = if task_type.is_coding_family() && !ctx.strict {
        if let Some(helper) = &ctx.helper_agent {
            helper_agent::run(task, report, helper.as_ref(), ctx.working_directory, ctx.prompt_log).await?
        } else {
            report
        }
    } else {
        report
    };
    if report.valid {
        return Ok(report);
    }

    if task_type == crate::domain::task::TaskType::Behavioral {
        return Ok(report);
    }

    if let Some(helper) = &ctx.helper_agent {
        interrogation::run(task, report, attempt, helper.as_ref(), ctx.working_directory, ctx.state_store.as_ref(), ctx.prompt_log, ctx.strict).await
    } else {
        Ok(report)
    }
}

/// Detects the AMBIGUITY halt condition: the raw response hedges
/// ("could"/"maybe") without naming a definitive artifact.
#[must_use]
pub fn is_ambiguous_response(raw_response: &str) -> bool {
    let lower = raw_response.to_lowercase();
    (lower.contains("could") || lower.contains("maybe")) && !lower.contains("files_created") && !lower.contains("file_created")
}

/// Detects the ASKED_QUESTION halt condition: the agent's response is
/// itself a question rather than a completion claim.
#[must_use]
pub fn is_asked_question(raw_response: &str) -> bool {
    let trimmed = raw_response.trim_end();
    trimmed.ends_with('?') && !trimmed.to_lowercase().contains("\"status\"")
}

#[must_use]
pub fn worst_confidence(a: Confidence, b: Confidence) -> Confidence {
    a.min(b)
}
