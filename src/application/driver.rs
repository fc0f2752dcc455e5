//! The control loop: one iteration pulls at most one task through
//! dispatch, validation, and finalize/retry/halt, then returns to the
//! caller. `run_forever` is a thin wrapper that sleeps between idle
//! iterations; `run_iteration` does the actual state machine step and
//! is what the integration tests drive directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::application::finalizer;
use crate::application::prompt_builder::{self, StateSnapshot};
use crate::application::repository::{StateRepository, TaskQueueRepository};
use crate::application::retry_policy::{self, RetryOutcome};
use crate::application::session_manager::{self, SessionDiscovery};
use crate::application::task_retriever;
use crate::application::validation::{self, ValidationContext};
use crate::config::Config;
use crate::domain::state::{SupervisorState, SupervisorStatus};
use crate::domain::validation::RuleCatalog;
use crate::error::{Result, SupervisorError};
use crate::infrastructure::audit::audit_log::{AuditEntry, AuditEvent};
use crate::infrastructure::audit::{AuditLog, PromptKind, PromptLog};
use crate::ports::agent_provider::DispatchRequest;
use crate::ports::StateStore;

/// What happened in one `run_iteration` call; the CLI's `status`
/// command and the integration tests both inspect this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing in flight, retry slot, or queue; the driver should sleep.
    Idle,
    /// Queue drained and goal-completion checking is disabled (or no
    /// goal is set); `queue_exhausted` was recorded.
    QueueExhausted,
    /// The goal-completion check judged the goal achieved.
    GoalCompleted,
    Completed { task_id: String },
    Retried { task_id: String },
    Blocked { task_id: String },
    /// The supervisor transitioned to HALTED; no further iterations run
    /// until an operator `resume`.
    Halted { reason: String },
    /// Already halted when this iteration began; a no-op.
    AlreadyHalted { reason: String },
}

pub struct Driver {
    config: Config,
    state_repo: StateRepository,
    queue_repo: TaskQueueRepository,
    providers: Arc<crate::infrastructure::providers::registry::ProviderRegistry>,
    helper_agent: Option<Arc<dyn crate::ports::agent_provider::AgentProvider>>,
    session_discovery: Arc<dyn SessionDiscovery>,
    rule_catalog: RuleCatalog,
    audit_log: AuditLog,
    prompt_log: PromptLog,
    state_store: Arc<dyn StateStore>,
    project_working_directory: PathBuf,
    /// In-memory only: the last `repeated_failure_threshold` reason keys
    /// per task, used to gate strict-mode validation. Not persisted —
    /// a crash simply forgets the streak and re-tries non-strict, which
    /// only costs an extra helper-agent round, never correctness.
    failure_history: Mutex<HashMap<String, Vec<String>>>,
}

#[allow(clippy::too_many_arguments)]
impl Driver {
    #[must_use]
    pub fn new(
        config: Config,
        state_store: Arc<dyn StateStore>,
        providers: Arc<crate::infrastructure::providers::registry::ProviderRegistry>,
        helper_agent: Option<Arc<dyn crate::ports::agent_provider::AgentProvider>>,
        session_discovery: Arc<dyn SessionDiscovery>,
        rule_catalog: RuleCatalog,
        project_working_directory: PathBuf,
    ) -> Self {
        let state_repo = StateRepository::new(Arc::clone(&state_store), config.state_store.state_key.clone());
        let queue_repo = TaskQueueRepository::new(Arc::clone(&state_store), config.state_store.queue_key.clone());
        let audit_log = AuditLog::new(&project_working_directory);
        let prompt_log = PromptLog::new(&project_working_directory);
        Self {
            config,
            state_repo,
            queue_repo,
            providers,
            helper_agent,
            session_discovery,
            rule_catalog,
            audit_log,
            prompt_log,
            state_store,
            project_working_directory,
            failure_history: Mutex::new(HashMap::new()),
        }
    }

    fn record_failure(&self, task_id: &str, reason_key: &str) -> bool {
        let threshold = self.config.repeated_failure_threshold;
        let mut history = self.failure_history.lock().expect("failure history mutex poisoned");
        let entry = history.entry(task_id.to_string()).or_default();
        entry.push(reason_key.to_string());
        let cap = threshold.max(1) as usize;
        if entry.len() > cap {
            entry.remove(0);
        }
        retry_policy::is_repeated_identical_failure(entry, threshold)
    }

    fn clear_failure_history(&self, task_id: &str) {
        self.failure_history.lock().expect("failure history mutex poisoned").remove(task_id);
    }

    /// Runs iterations until the supervisor halts or completes,
    /// sleeping `poll_interval_seconds` whenever there is nothing to do.
    pub async fn run_forever(&self) -> Result<()> {
        loop {
            let outcome = self.run_iteration().await?;
            match outcome {
                IterationOutcome::Halted { reason } | IterationOutcome::AlreadyHalted { reason } => {
                    warn!(reason, "supervisor halted");
                    return Ok(());
                }
                IterationOutcome::GoalCompleted => {
                    info!("goal marked complete");
                    return Ok(());
                }
                IterationOutcome::Idle | IterationOutcome::QueueExhausted => {
                    tokio::time::sleep(std::time::Duration::from_secs(self.config.poll_interval_seconds)).await;
                }
                _ => {}
            }
        }
    }

    /// One pass of LOAD_STATE → RETRIEVE_TASK → [EXECUTE → VALIDATE →
    /// FINALIZE/RETRY/ESCALATE/HALT] → IDLE.
    pub async fn run_iteration(&self) -> Result<IterationOutcome> {
        let mut state = self
            .state_repo
            .load()
            .await?
            .ok_or_else(|| SupervisorError::Internal("supervisor state not initialized; run init-state first".into()))?;

        if state.sub_state.status == SupervisorStatus::Halted {
            return Ok(IterationOutcome::AlreadyHalted {
                reason: state.sub_state.halt_reason.clone().unwrap_or_default(),
            });
        }

        let Some((task, source)) = task_retriever::retrieve_next(&mut state, &self.queue_repo).await? else {
            return self.handle_empty_queue(state).await;
        };

        info!(task_id = %task.task_id, source = ?source, "retrieved task");
        self.state_repo.save(&state).await?;
        let entry = AuditEntry::new(state.sub_state.iteration, AuditEvent::StateTransition, serde_json::json!({"task_source": source}))
            .with_task_id(task.task_id.clone());
        self.audit_log.append_best_effort(&entry).await;

        let working_directory = task
            .working_directory
            .as_ref()
            .map_or_else(|| self.project_working_directory.clone(), PathBuf::from);

        let feature_id = task.feature_id(state.goal.as_ref().map_or("default", |g| g.project_id.as_str()));
        let resolved = session_manager::resolve(
            &mut state,
            &self.config,
            &task.provider,
            &feature_id,
            task.meta.session_id.as_deref(),
            self.session_discovery.as_ref(),
        )
        .await;

        let snapshot: StateSnapshot = prompt_builder::build_snapshot(&task, &state, &working_directory);
        let mut prompt = prompt_builder::build_prompt(&task, &snapshot);
        if resolved.is_new {
            prompt = session_manager::inject_feature_tag(&prompt, &feature_id);
        }
        self.prompt_log.append_best_effort(PromptKind::Prompt, Some(&task.task_id), &prompt).await;

        let dispatch_result = self
            .providers
            .dispatch(
                Some(&task.provider),
                DispatchRequest {
                    prompt: prompt.clone(),
                    working_directory: working_directory.clone(),
                    agent_mode: task.agent_mode.clone(),
                    session_id: resolved.session_id.clone(),
                    feature_id: Some(feature_id.clone()),
                },
            )
            .await;

        let (tool, outcome) = match dispatch_result {
            Ok(pair) => pair,
            Err(err) => {
                session_manager::record_error(&mut state, &feature_id);
                return self.fail_iteration(state, &task, err, None, &prompt, "").await;
            }
        };
        self.prompt_log.append_best_effort(PromptKind::Response, Some(&task.task_id), &outcome.parsed_output).await;

        if outcome.resource_exhausted {
            return self
                .fail_iteration(state, &task, SupervisorError::ProviderQuotaExhausted(tool), None, &prompt, &outcome.parsed_output)
                .await;
        }

        session_manager::record_success(
            &mut state,
            &feature_id,
            &tool,
            outcome
                .new_session_id
                .clone()
                .or_else(|| resolved.session_id.clone())
                .unwrap_or_else(session_manager::generate_session_id),
            resolved.session_id.is_some(),
            outcome.usage.as_ref().and_then(|u| u.tokens).unwrap_or(0),
        );

        if validation::is_asked_question(&outcome.parsed_output) {
            return self
                .fail_iteration(state, &task, SupervisorError::AgentAskedQuestion(outcome.parsed_output.clone()), None, &prompt, &outcome.parsed_output)
                .await;
        }
        if validation::is_ambiguous_response(&outcome.parsed_output) {
            return self
                .fail_iteration(state, &task, SupervisorError::ValidationAmbiguous(outcome.parsed_output.clone()), None, &prompt, &outcome.parsed_output)
                .await;
        }

        let strict = {
            let history = self.failure_history.lock().expect("failure history mutex poisoned");
            history
                .get(&task.task_id)
                .is_some_and(|h| retry_policy::is_repeated_identical_failure(h, self.config.repeated_failure_threshold))
        };
        let attempt = state.sub_state.retry_counts.get(&task.task_id).copied().unwrap_or(0) + 1;
        let ctx = ValidationContext {
            working_directory: &working_directory,
            rule_catalog: &self.rule_catalog,
            helper_agent: self.helper_agent.clone(),
            prompt_log: &self.prompt_log,
            state_store: Arc::clone(&self.state_store),
            strict,
        };
        let report = validation::run_pipeline(&task, attempt, &outcome.parsed_output, &ctx).await?;

        if report.valid {
            self.clear_failure_history(&task.task_id);
            let completed = finalizer::finalize_and_persist(&mut state, &task, report, &tool, &prompt, &outcome.parsed_output, &self.state_repo, &self.audit_log)
                .await?;
            return Ok(IterationOutcome::Completed { task_id: completed.task_id });
        }

        self.record_failure(&task.task_id, report.reason_key());
        self.fail_iteration(state, &task, SupervisorError::ValidationFailed(report.reason_key().to_string()), Some(report), &prompt, &outcome.parsed_output)
            .await
    }

    async fn handle_empty_queue(&self, mut state: SupervisorState) -> Result<IterationOutcome> {
        if self.queue_repo.is_empty().await? {
            if self.config.is_enabled_goal_completion_check {
                if let (Some(goal), Some(helper)) = (state.goal.clone(), self.helper_agent.as_ref()) {
                    let snapshot = prompt_builder::build_snapshot(
                        &crate::domain::task::Task::new("goal-check", &goal.description, &goal.project_id),
                        &state,
                        &self.project_working_directory,
                    );
                    let prompt = prompt_builder::build_goal_completion_prompt(&goal.description, &snapshot);
                    self.prompt_log.append_best_effort(PromptKind::GoalCompletionCheck, None, &prompt).await;
                    let outcome = helper
                        .dispatch(DispatchRequest {
                            prompt: prompt.clone(),
                            working_directory: self.project_working_directory.clone(),
                            agent_mode: None,
                            session_id: None,
                            feature_id: None,
                        })
                        .await?;
                    self.prompt_log.append_best_effort(PromptKind::GoalCompletionResponse, None, &outcome.parsed_output).await;
                    let complete = serde_json::from_str::<serde_json::Value>(&outcome.parsed_output)
                        .ok()
                        .and_then(|v| v.get("complete").and_then(serde_json::Value::as_bool))
                        .unwrap_or(false);
                    if complete {
                        if let Some(goal) = &mut state.goal {
                            goal.completed = true;
                        }
                        state.sub_state.status = SupervisorStatus::Completed;
                        state.touch();
                        self.state_repo.save(&state).await?;
                        let entry = AuditEntry::new(state.sub_state.iteration, AuditEvent::StateTransition, serde_json::json!({"to": "COMPLETED"}));
                        self.audit_log.append_best_effort(&entry).await;
                        return Ok(IterationOutcome::GoalCompleted);
                    }
                }
            }
            state.queue_exhausted = true;
            state.touch();
            self.state_repo.save(&state).await?;
            let entry = AuditEntry::new(state.sub_state.iteration, AuditEvent::QueueExhausted, serde_json::Value::Null);
            self.audit_log.append_best_effort(&entry).await;
            return Ok(IterationOutcome::QueueExhausted);
        }
        Ok(IterationOutcome::Idle)
    }

    async fn fail_iteration(
        &self,
        mut state: SupervisorState,
        task: &crate::domain::task::Task,
        error: SupervisorError,
        report: Option<crate::domain::validation::ValidationReport>,
        prompt: &str,
        response: &str,
    ) -> Result<IterationOutcome> {
        let before = serde_json::to_value(&state).unwrap_or(serde_json::Value::Null);
        let outcome = retry_policy::apply(&mut state, task, &error, report.as_ref(), self.config.default_retry_max);
        self.state_repo.save(&state).await?;
        let after = serde_json::to_value(&state).unwrap_or(serde_json::Value::Null);

        let event = match outcome {
            RetryOutcome::Retry => AuditEvent::StateTransition,
            RetryOutcome::Blocked => AuditEvent::TaskBlocked,
            RetryOutcome::Halted => AuditEvent::Halt,
        };
        let entry = AuditEntry::new(state.sub_state.iteration, event, serde_json::json!({"before": before, "after": after}))
            .with_task_id(task.task_id.clone())
            .with_validation_summary(error.to_string())
            .with_previews(prompt, response);
        self.audit_log.append_best_effort(&entry).await;

        Ok(match outcome {
            RetryOutcome::Retry => IterationOutcome::Retried { task_id: task.task_id.clone() },
            RetryOutcome::Blocked => IterationOutcome::Blocked { task_id: task.task_id.clone() },
            RetryOutcome::Halted => IterationOutcome::Halted {
                reason: state.sub_state.halt_reason.clone().unwrap_or_default(),
            },
        })
    }
}
