//! Outcomes for a failing (or halting) iteration: retry, block,
//! schedule a resource-exhausted backoff, or halt outright. Applied
//! against the same `SupervisorState` value the driver already holds;
//! nothing here talks to a store directly.

use crate::domain::state::{ResourceExhaustedRetry, SupervisorState};
use crate::domain::task::{BlockedTask, Task};
use crate::domain::validation::ValidationReport;
use crate::error::SupervisorError;

/// What the driver should do next after `apply` mutates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Stored in `retry_slot`; the driver redispatches it next iteration.
    Retry,
    /// Moved into `blocked_tasks`; the driver advances to the next queued task.
    Blocked,
    /// Halted with a reason recorded in `sub_state.halt_reason`.
    Halted,
}

const RESOURCE_EXHAUSTED_BASE_DELAY_SECONDS: i64 = 60;

/// Applies the retry/halt policy for one failed attempt. `error` is the
/// classification that came out of dispatch or validation; `report` is
/// the validation report attached when the failure came from
/// validation rather than dispatch (absent for halt-class errors that
/// never reached validation, e.g. a transport failure).
pub fn apply(state: &mut SupervisorState, task: &Task, error: &SupervisorError, report: Option<&ValidationReport>, max_retries: u32) -> RetryOutcome {
    if let Some(reason) = error.halt_reason() {
        if reason == "RESOURCE_EXHAUSTED" {
            let schedule = ResourceExhaustedRetry::schedule(
                state.sub_state.resource_exhausted_retry.as_ref(),
                chrono::Duration::seconds(RESOURCE_EXHAUSTED_BASE_DELAY_SECONDS),
                chrono::Utc::now(),
            );
            state.sub_state.resource_exhausted_retry = Some(schedule);
            state.current_task = None;
            state.retry_slot = Some(task.clone());
        }
        state.halt(reason, Some(error.to_string()));
        state.touch();
        return RetryOutcome::Halted;
    }

    let retry_count = state.sub_state.retry_counts.entry(task.task_id.clone()).or_insert(0);
    *retry_count += 1;
    let attempts_so_far = *retry_count;

    if attempts_so_far <= max_retries {
        state.current_task = None;
        state.retry_slot = Some(task.clone());
        state.touch();
        return RetryOutcome::Retry;
    }

    state.sub_state.retry_counts.remove(&task.task_id);
    let reason = report
        .and_then(|r| r.failure_reason.clone())
        .unwrap_or_else(|| error.to_string());
    state.push_blocked(BlockedTask {
        task_id: task.task_id.clone(),
        blocked_at: chrono::Utc::now(),
        reason,
    });
    state.current_task = None;
    state.retry_slot = None;
    state.touch();
    RetryOutcome::Blocked
}

/// Repeated-identical-failure detection: true once the same
/// `reason_key()` has failed `threshold` times in a row for this task,
/// which the driver uses to set `ValidationContext::strict` for the
/// next attempt (helper-agent override disabled, interrogation
/// requires every criterion COMPLETE).
#[must_use]
pub fn is_repeated_identical_failure(history: &[String], threshold: u32) -> bool {
    if threshold == 0 {
        return false;
    }
    let threshold = threshold as usize;
    if history.len() < threshold {
        return false;
    }
    let tail = &history[history.len() - threshold..];
    tail.windows(2).all(|pair| pair[0] == pair[1])
}
