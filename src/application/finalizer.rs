use crate::application::repository::StateRepository;
use crate::domain::state::SupervisorState;
use crate::domain::task::{CompletedTask, Task};
use crate::domain::validation::ValidationReport;
use crate::error::Result;
use crate::infrastructure::audit::audit_log::{AuditEntry, AuditEvent};
use crate::infrastructure::audit::AuditLog;

/// Builds the completed-task record for a valid report. Pure: the
/// caller decides when to persist the resulting state. Failure inside
/// this step must not partially mutate state, so everything here
/// happens against a value the caller already owns exclusively.
#[must_use]
pub fn build_completed_record(task: &Task, report: &ValidationReport) -> CompletedTask {
    CompletedTask {
        task_id: task.task_id.clone(),
        completed_at: chrono::Utc::now(),
        intent: task.intent.clone(),
        summary: CompletedTask::success_summary(&task.intent),
        requires_context: true,
        report: report.clone(),
    }
}

/// Applies the finalize steps to `state` in memory: increments
/// iteration, records `last_task_id`/`last_validation_report`, appends
/// the completed record (pruned to the cap), clears `current_task`,
/// and clears any stale resource-exhausted schedule.
pub fn apply(state: &mut SupervisorState, task: &Task, report: ValidationReport) -> CompletedTask {
    state.sub_state.iteration += 1;
    state.sub_state.last_task_id = Some(task.task_id.clone());
    state.sub_state.last_validation_report = Some(report.clone());

    let completed = build_completed_record(task, &report);
    state.push_completed(completed.clone());

    state.current_task = None;
    state.sub_state.retry_counts.remove(&task.task_id);
    if state.sub_state.halt_reason.as_deref() == Some("RESOURCE_EXHAUSTED") {
        state.sub_state.resource_exhausted_retry = None;
        state.sub_state.halt_reason = None;
    }
    state.touch();

    completed
}

/// Finalizes, persists the full snapshot, then appends the audit entry
/// — in that order, so a crash between persist and audit leaves state
/// consistent and only the audit record replayable from the next
/// dispatch's prompt/response logs.
pub async fn finalize_and_persist(
    state: &mut SupervisorState,
    task: &Task,
    report: ValidationReport,
    tool: &str,
    prompt: &str,
    response: &str,
    repo: &StateRepository,
    audit: &AuditLog,
) -> Result<CompletedTask> {
    let before = serde_json::to_value(&*state).unwrap_or(serde_json::Value::Null);
    let completed = apply(state, task, report.clone());
    repo.save(state).await?;

    let after = serde_json::to_value(&*state).unwrap_or(serde_json::Value::Null);
    let entry = AuditEntry::new(state.sub_state.iteration, AuditEvent::TaskCompleted, serde_json::json!({"before": before, "after": after}))
        .with_task_id(task.task_id.clone())
        .with_tool(tool)
        .with_validation_summary(report.failure_reason.clone().unwrap_or_else(|| "valid".to_string()))
        .with_previews(prompt, response);
    audit.append_best_effort(&entry).await;

    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::ExecutionMode;
    use crate::domain::validation::Confidence;

    #[test]
    fn apply_increments_iteration_and_records_last_task() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        let task = Task::new("t-001", "Create utils file", "claude").with_acceptance_criteria(vec!["x".into()]);
        let report = ValidationReport::trivial_pass();
        apply(&mut state, &task, report);
        assert_eq!(state.sub_state.iteration, 1);
        assert_eq!(state.sub_state.last_task_id.as_deref(), Some("t-001"));
        assert_eq!(state.completed_tasks.len(), 1);
        assert!(state.current_task.is_none());
    }

    #[test]
    fn success_summary_uses_completed_prefix() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        let task = Task::new("t-001", "Create utils file", "claude").with_acceptance_criteria(vec!["x".into()]);
        apply(&mut state, &task, ValidationReport::trivial_pass());
        assert_eq!(state.completed_tasks.back().unwrap().summary, "Completed: Create utils file");
    }

    #[test]
    fn clears_stale_resource_exhausted_schedule() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        state.sub_state.halt_reason = Some("RESOURCE_EXHAUSTED".to_string());
        state.sub_state.resource_exhausted_retry = Some(crate::domain::state::ResourceExhaustedRetry::schedule(None, chrono::Duration::seconds(1), chrono::Utc::now()));
        let task = Task::new("t-001", "x", "claude").with_acceptance_criteria(vec!["y".into()]);
        apply(&mut state, &task, ValidationReport::failing("unused", Confidence::Low));
        assert!(state.sub_state.resource_exhausted_retry.is_none());
        assert!(state.sub_state.halt_reason.is_none());
    }
}
