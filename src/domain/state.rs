use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::goal::Goal;
use super::session::Session;
use super::task::{BlockedTask, CompletedTask, Task};
use super::validation::ValidationReport;

/// Cap on `completed_tasks`; pruning always drops the oldest entry, never
/// the tail.
pub const COMPLETED_TASKS_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SupervisorStatus {
    Running,
    Blocked,
    Halted,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    Auto,
    Manual,
}

/// An exponential-backoff schedule recorded when a provider reports
/// quota exhaustion; the driver refuses to proceed until `next_retry_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceExhaustedRetry {
    pub attempt: u32,
    pub last_attempt_at: chrono::DateTime<chrono::Utc>,
    pub next_retry_at: chrono::DateTime<chrono::Utc>,
}

impl ResourceExhaustedRetry {
    /// Schedules (or advances) the backoff using the `backoff` crate's
    /// `ExponentialBackoff`: delay doubles per attempt from `base`, with
    /// jitter disabled so the schedule stays reproducible from state.
    #[must_use]
    pub fn schedule(previous: Option<&Self>, base: chrono::Duration, now: chrono::DateTime<chrono::Utc>) -> Self {
        use backoff::backoff::Backoff;

        let attempt = previous.map_or(1, |p| p.attempt + 1);
        let mut policy = backoff::ExponentialBackoff {
            initial_interval: base.to_std().unwrap_or(std::time::Duration::from_secs(1)),
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: std::time::Duration::from_secs(60 * 60 * 24 * 365),
            max_elapsed_time: None,
            ..backoff::ExponentialBackoff::default()
        };
        policy.reset();

        let mut delay = policy.initial_interval;
        for _ in 0..attempt {
            delay = policy.next_backoff().unwrap_or(delay);
        }

        Self {
            attempt,
            last_attempt_at: now,
            next_retry_at: now + chrono::Duration::from_std(delay).unwrap_or(base),
        }
    }

    #[must_use]
    pub fn due(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.next_retry_at
    }
}

/// The supervisor's own sub-state: everything about "where the control
/// loop is," distinct from the goal/task/session data it operates over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubState {
    pub status: SupervisorStatus,
    #[serde(default)]
    pub iteration: u64,
    #[serde(default)]
    pub last_task_id: Option<String>,
    #[serde(default)]
    pub last_validation_report: Option<ValidationReport>,
    #[serde(default)]
    pub halt_reason: Option<String>,
    #[serde(default)]
    pub halt_details: Option<String>,
    #[serde(default)]
    pub resource_exhausted_retry: Option<ResourceExhaustedRetry>,
    /// Retry counters keyed by task id, stored inside the sub-state
    /// rather than as free-form top-level properties.
    #[serde(default)]
    pub retry_counts: HashMap<String, u32>,
}

impl Default for SubState {
    fn default() -> Self {
        Self {
            status: SupervisorStatus::Running,
            iteration: 0,
            last_task_id: None,
            last_validation_report: None,
            halt_reason: None,
            halt_details: None,
            resource_exhausted_retry: None,
            retry_counts: HashMap::new(),
        }
    }
}

/// The single persisted object: full-snapshot state for the control
/// loop. Every write is a read-modify-write full overwrite at one
/// storage key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorState {
    pub sub_state: SubState,
    #[serde(default)]
    pub goal: Option<Goal>,
    #[serde(default)]
    pub current_task: Option<Task>,
    #[serde(default)]
    pub retry_slot: Option<Task>,
    #[serde(default)]
    pub completed_tasks: VecDeque<CompletedTask>,
    #[serde(default)]
    pub blocked_tasks: Vec<BlockedTask>,
    #[serde(default)]
    pub active_sessions: HashMap<String, Session>,
    #[serde(default)]
    pub queue_exhausted: bool,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub execution_mode: ExecutionMode,
}

impl SupervisorState {
    #[must_use]
    pub fn new(execution_mode: ExecutionMode) -> Self {
        Self {
            sub_state: SubState::default(),
            goal: None,
            current_task: None,
            retry_slot: None,
            completed_tasks: VecDeque::new(),
            blocked_tasks: Vec::new(),
            active_sessions: HashMap::new(),
            queue_exhausted: false,
            last_updated: chrono::Utc::now(),
            execution_mode,
        }
    }

    /// Appends a completion, then prunes to the cap — the oldest entry
    /// is dropped first, the newest is always at the tail.
    pub fn push_completed(&mut self, completed: CompletedTask) {
        self.completed_tasks.push_back(completed);
        while self.completed_tasks.len() > COMPLETED_TASKS_CAP {
            self.completed_tasks.pop_front();
        }
    }

    pub fn push_blocked(&mut self, blocked: BlockedTask) {
        self.blocked_tasks.push(blocked);
    }

    /// Transitions to `HALTED` with a reason/details pair. Once halted,
    /// `goal`/`completed_tasks`/`blocked_tasks`/`current_task` must not
    /// change until an explicit `resume`.
    pub fn halt(&mut self, reason: impl Into<String>, details: Option<String>) {
        self.sub_state.status = SupervisorStatus::Halted;
        self.sub_state.halt_reason = Some(reason.into());
        self.sub_state.halt_details = details;
    }

    /// Whether a `resume` command may transition this state back to
    /// `RUNNING`. Refuses while a resource-exhaustion backoff has not
    /// yet elapsed.
    #[must_use]
    pub fn can_resume(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        if self.sub_state.status != SupervisorStatus::Halted {
            return false;
        }
        match &self.sub_state.resource_exhausted_retry {
            Some(retry) => retry.due(now),
            None => true,
        }
    }

    pub fn resume(&mut self) {
        self.sub_state.status = SupervisorStatus::Running;
        self.sub_state.halt_reason = None;
        self.sub_state.halt_details = None;
        self.sub_state.resource_exhausted_retry = None;
    }

    pub fn touch(&mut self) {
        self.last_updated = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_completed(id: &str) -> CompletedTask {
        CompletedTask {
            task_id: id.to_string(),
            completed_at: chrono::Utc::now(),
            intent: id.to_string(),
            summary: "Completed: x".into(),
            requires_context: true,
            report: ValidationReport::trivial_pass(),
        }
    }

    #[test]
    fn completed_tasks_prunes_oldest_first() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        for i in 0..COMPLETED_TASKS_CAP {
            state.push_completed(sample_completed(&format!("t-{i}")));
        }
        state.push_completed(sample_completed("t-new"));
        assert_eq!(state.completed_tasks.len(), COMPLETED_TASKS_CAP);
        assert_eq!(state.completed_tasks.front().unwrap().task_id, "t-1");
        assert_eq!(state.completed_tasks.back().unwrap().task_id, "t-new");
    }

    #[test]
    fn halt_then_resume_clears_reason() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        state.halt("AMBIGUITY", Some("agent said maybe".into()));
        assert_eq!(state.sub_state.status, SupervisorStatus::Halted);
        assert!(state.can_resume(chrono::Utc::now()));
        state.resume();
        assert_eq!(state.sub_state.status, SupervisorStatus::Running);
        assert!(state.sub_state.halt_reason.is_none());
    }

    #[test]
    fn resume_refused_before_backoff_elapses() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        let now = chrono::Utc::now();
        state.sub_state.resource_exhausted_retry = Some(ResourceExhaustedRetry::schedule(None, chrono::Duration::minutes(5), now));
        state.halt("RESOURCE_EXHAUSTED", None);
        assert!(!state.can_resume(now));
        assert!(state.can_resume(now + chrono::Duration::minutes(10)));
    }

    #[test]
    fn resource_exhausted_backoff_doubles() {
        let now = chrono::Utc::now();
        let first = ResourceExhaustedRetry::schedule(None, chrono::Duration::seconds(10), now);
        let second = ResourceExhaustedRetry::schedule(Some(&first), chrono::Duration::seconds(10), now);
        assert_eq!(first.attempt, 1);
        assert_eq!(second.attempt, 2);
        assert!(second.next_retry_at - second.last_attempt_at > first.next_retry_at - first.last_attempt_at);
    }
}
