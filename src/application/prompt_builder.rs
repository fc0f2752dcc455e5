//! Deterministic prompt assembly. `build_prompt` is a pure function of
//! (task, snapshot): identical inputs always produce byte-identical
//! output, which is what makes prompt/response previews and audit
//! diffs meaningful across replays.

use std::path::{Path, PathBuf};

use crate::domain::task::{Task, TaskType};
use crate::domain::state::SupervisorState;
use crate::domain::validation::ValidationReport;

/// A compact view of a completed task, as embedded in the snapshot.
#[derive(Debug, Clone)]
pub struct CompletedSummary {
    pub task_id: String,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub intent: String,
    pub success: bool,
}

/// A compact view of a blocker, as embedded in the snapshot.
#[derive(Debug, Clone)]
pub struct BlockerSummary {
    pub task_id: String,
    pub reason: String,
}

/// The minimal deterministic context handed to the prompt builder
/// alongside the task. Always includes project id, working directory,
/// the 5 most recent completions, and all active blockers; the rest is
/// gated by literal keyword matches on the task's own text.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub project_id: String,
    pub working_directory: PathBuf,
    pub recent_completed: Vec<CompletedSummary>,
    pub active_blockers: Vec<BlockerSummary>,
    pub goal_description: Option<String>,
    pub last_task_id: Option<String>,
    pub extended_completed: Option<Vec<CompletedSummary>>,
    pub blocker_details: Option<Vec<BlockerSummary>>,
}

const RECENT_COMPLETED_LIMIT: usize = 5;
const EXTENDED_COMPLETED_LIMIT: usize = 5;

/// Builds the snapshot for one task against the current state. The
/// conditional sections are gated by lowercase keyword search over
/// `task.intent` + `task.instructions` + the joined acceptance
/// criteria, exactly as the always-included fields are gated by
/// nothing (they are unconditional).
#[must_use]
pub fn build_snapshot(task: &Task, state: &SupervisorState, working_directory: &Path) -> StateSnapshot {
    let haystack = format!(
        "{} {} {}",
        task.intent.to_lowercase(),
        task.instructions.to_lowercase(),
        task.acceptance_criteria.join(" ").to_lowercase()
    );

    let project_id = state.goal.as_ref().map_or_else(|| "default".to_string(), |g| g.project_id.clone());

    let recent_completed: Vec<CompletedSummary> = state
        .completed_tasks
        .iter()
        .rev()
        .take(RECENT_COMPLETED_LIMIT)
        .map(|c| CompletedSummary {
            task_id: c.task_id.clone(),
            completed_at: c.completed_at,
            intent: c.intent.clone(),
            success: c.report.valid,
        })
        .collect();

    let active_blockers: Vec<BlockerSummary> = state
        .blocked_tasks
        .iter()
        .map(|b| BlockerSummary { task_id: b.task_id.clone(), reason: b.reason.clone() })
        .collect();

    let goal_description = if haystack.contains("goal") {
        state.goal.as_ref().map(|g| g.description.clone())
    } else {
        None
    };

    let last_task_id = if haystack.contains("previous") || haystack.contains("last task") || haystack.contains("continue") {
        state.sub_state.last_task_id.clone()
    } else {
        None
    };

    let extended_completed = if haystack.contains("extend") || haystack.contains("build on") {
        Some(
            state
                .completed_tasks
                .iter()
                .rev()
                .take(EXTENDED_COMPLETED_LIMIT)
                .map(|c| CompletedSummary {
                    task_id: c.task_id.clone(),
                    completed_at: c.completed_at,
                    intent: c.intent.clone(),
                    success: c.report.valid,
                })
                .collect(),
        )
    } else {
        None
    };

    let blocker_details = if haystack.contains("unblock") || haystack.contains("blocked") {
        Some(active_blockers.clone())
    } else {
        None
    };

    StateSnapshot {
        project_id,
        working_directory: working_directory.to_path_buf(),
        recent_completed,
        active_blockers,
        goal_description,
        last_task_id,
        extended_completed,
        blocker_details,
    }
}

/// Removes absolute paths, paths containing `..`, paths starting with
/// `~`, and paths that do not exist under `working_directory`.
#[must_use]
pub fn sanitize_file_paths(paths: &[String], working_directory: &Path) -> Vec<String> {
    paths
        .iter()
        .filter(|p| {
            let path = Path::new(p.as_str());
            !path.is_absolute() && !p.contains("..") && !p.starts_with('~') && working_directory.join(path).exists()
        })
        .cloned()
        .collect()
}

struct TaskTypeStrategy {
    rules: &'static [&'static str],
    guidelines: &'static [&'static str],
    output_contract: &'static str,
}

const CODING_LIKE_CONTRACT: &str =
    r#"{"status": "completed"|"failed", "files_created": [string], "files_updated": [string], "changes": [string], "neededChanges": boolean, "reasoning": string, "summary": string}"#;
const BEHAVIORAL_CONTRACT: &str = r#"{"status": "completed"|"failed", "response": string, "confidence": "HIGH"|"LOW"|"UNCERTAIN", "reasoning": string}"#;
const VERIFICATION_CONTRACT: &str = r#"{"status": "completed"|"failed", "findings": [string], "verdict": "pass"|"fail", "reasoning": string}"#;

fn strategy_for(task_type: TaskType) -> TaskTypeStrategy {
    match task_type {
        TaskType::Behavioral => TaskTypeStrategy {
            rules: &["Respond directly to the user's intent.", "Do not claim work was done that was not done."],
            guidelines: &["Prefer a direct answer over a clarifying question unless truly ambiguous."],
            output_contract: BEHAVIORAL_CONTRACT,
        },
        TaskType::Verification => TaskTypeStrategy {
            rules: &["Inspect the working directory; do not assume file contents.", "State a definitive pass/fail verdict."],
            guidelines: &["List concrete findings, not generalities."],
            output_contract: VERIFICATION_CONTRACT,
        },
        TaskType::Coding
        | TaskType::Configuration
        | TaskType::Documentation
        | TaskType::Testing
        | TaskType::Refactoring
        | TaskType::Research
        | TaskType::Orchestration
        | TaskType::Implementation => TaskTypeStrategy {
            rules: &[
                "Only modify files under the working directory.",
                "List every file you created or updated.",
                "Set status to \"completed\" only if every acceptance criterion is satisfied.",
            ],
            guidelines: &["Prefer small, verifiable changes.", "Summaries must be factual, not aspirational."],
            output_contract: CODING_LIKE_CONTRACT,
        },
    }
}

fn render_snapshot(snapshot: &StateSnapshot) -> String {
    let mut lines = vec![
        format!("Project: {}", snapshot.project_id),
        format!("Working directory: {}", snapshot.working_directory.display()),
    ];

    if !snapshot.recent_completed.is_empty() {
        lines.push("Recently completed tasks:".to_string());
        for c in &snapshot.recent_completed {
            lines.push(format!("- [{}] {} ({}) — {}", c.task_id, c.intent, if c.success { "success" } else { "failure" }, c.completed_at.to_rfc3339()));
        }
    }

    if !snapshot.active_blockers.is_empty() {
        lines.push("Active blockers:".to_string());
        for b in &snapshot.active_blockers {
            lines.push(format!("- [{}] {}", b.task_id, b.reason));
        }
    }

    if let Some(goal) = &snapshot.goal_description {
        lines.push(format!("Goal: {goal}"));
    }
    if let Some(last_task_id) = &snapshot.last_task_id {
        lines.push(format!("Last task id: {last_task_id}"));
    }
    if let Some(extended) = &snapshot.extended_completed {
        lines.push("Extended completion history:".to_string());
        for c in extended {
            lines.push(format!("- [{}] {} ({})", c.task_id, c.intent, if c.success { "success" } else { "failure" }));
        }
    }
    if let Some(details) = &snapshot.blocker_details {
        lines.push("Blocker details:".to_string());
        for b in details {
            lines.push(format!("- [{}]: {}", b.task_id, b.reason));
        }
    }

    lines.join("\n")
}

/// Builds the agent's input as data, not instructions: the prompt is
/// deterministic in (task, snapshot).
#[must_use]
pub fn build_prompt(task: &Task, snapshot: &StateSnapshot) -> String {
    let mut sections = vec![
        format!("# Task {}", task.task_id),
        format!("Intent: {}", task.intent),
    ];
    if !task.instructions.is_empty() {
        sections.push(format!("Instructions:\n{}", task.instructions));
    }
    if !task.acceptance_criteria.is_empty() {
        let criteria = task
            .acceptance_criteria
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {c}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Acceptance criteria:\n{criteria}"));
    }
    sections.push(render_snapshot(snapshot));

    let strategy = strategy_for(task.effective_task_type());
    sections.push(format!("Rules:\n{}", strategy.rules.join("\n")));
    sections.push(format!("Guidelines:\n{}", strategy.guidelines.join("\n")));
    sections.push(format!("Respond with exactly one JSON object matching:\n{}", strategy.output_contract));

    sections.join("\n\n")
}

/// A fix prompt: the validation report plus up to 50 lines of each
/// file named in a failure.
#[must_use]
pub fn build_fix_prompt(task: &Task, report: &ValidationReport, file_previews: &[(String, String)]) -> String {
    let mut sections = vec![format!("# Fix required for task {}", task.task_id)];
    if let Some(reason) = &report.failure_reason {
        sections.push(format!("Validation failure: {reason}"));
    }
    if !report.failed_criteria.is_empty() {
        sections.push(format!("Failed criteria:\n{}", report.failed_criteria.join("\n")));
    }
    for (path, content) in file_previews {
        let preview: String = content.lines().take(50).collect::<Vec<_>>().join("\n");
        sections.push(format!("File {path}:\n{preview}"));
    }
    sections.join("\n\n")
}

/// A clarification prompt, enforced on AMBIGUITY or ASKED_QUESTION halts.
#[must_use]
pub fn build_clarification_prompt(task: &Task, halt_reason: &str) -> String {
    format!(
        "# Clarification needed for task {}\nThe previous response was classified as {halt_reason}. \
         State explicitly, in one sentence, whether the work described by the acceptance criteria \
         below is complete, and name any artifact produced.\n\nAcceptance criteria:\n{}",
        task.task_id,
        task.acceptance_criteria.join("\n")
    )
}

/// A goal-completion prompt: asks the agent to judge completion from
/// only state-derived context, never from the agent's own memory.
#[must_use]
pub fn build_goal_completion_prompt(goal_description: &str, snapshot: &StateSnapshot) -> String {
    format!(
        "# Goal completion check\nGoal: {goal_description}\n\n{}\n\nHas this goal been fully achieved? Respond with {{\"complete\": boolean, \"reasoning\": string}}.",
        render_snapshot(snapshot)
    )
}
