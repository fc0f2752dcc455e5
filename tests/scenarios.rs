//! Black-box control loop scenarios, driven entirely through
//! `Driver::run_iteration` against an in-memory state store and
//! scripted agent providers — no real subprocess or Redis involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use supervisor::application::driver::{Driver, IterationOutcome};
use supervisor::application::repository::{StateRepository, TaskQueueRepository};
use supervisor::application::session_manager::NoopSessionDiscovery;
use supervisor::config::Config;
use supervisor::domain::state::{ExecutionMode, SupervisorState};
use supervisor::domain::task::Task;
use supervisor::infrastructure::providers::registry::ProviderRegistry;
use supervisor::infrastructure::state_store::InMemoryStateStore;
use supervisor::ports::agent_provider::{AgentProvider, DispatchOutcome, DispatchRequest, DispatchStatus};
use supervisor::ports::StateStore;

struct FixedResponseProvider {
    name: String,
    response: String,
}

#[async_trait]
impl AgentProvider for FixedResponseProvider {
    fn name(&self) -> &str {
        &self.name
    }
    async fn is_available(&self) -> bool {
        true
    }
    async fn dispatch(&self, _request: DispatchRequest) -> supervisor::Result<DispatchOutcome> {
        Ok(DispatchOutcome {
            exit_code: 0,
            raw_output: self.response.clone(),
            parsed_output: self.response.clone(),
            new_session_id: Some("sid-fixed".into()),
            usage: None,
            status: DispatchStatus::Success,
            resource_exhausted: false,
        })
    }
}

struct AlwaysFailingProvider;

#[async_trait]
impl AgentProvider for AlwaysFailingProvider {
    fn name(&self) -> &str {
        "claude"
    }
    async fn is_available(&self) -> bool {
        true
    }
    async fn dispatch(&self, _request: DispatchRequest) -> supervisor::Result<DispatchOutcome> {
        Ok(DispatchOutcome {
            exit_code: 0,
            raw_output: r#"{"status":"failed","files_created":[],"files_updated":[],"changes":[],"neededChanges":false,"reasoning":"could not locate target","summary":"x"}"#.into(),
            parsed_output: r#"{"status":"failed","files_created":[],"files_updated":[],"changes":[],"neededChanges":false,"reasoning":"could not locate target","summary":"x"}"#.into(),
            new_session_id: Some("sid-1".into()),
            usage: None,
            status: DispatchStatus::Success,
            resource_exhausted: false,
        })
    }
}

struct ResourceExhaustedProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl AgentProvider for ResourceExhaustedProvider {
    fn name(&self) -> &str {
        "claude"
    }
    async fn is_available(&self) -> bool {
        true
    }
    async fn dispatch(&self, _request: DispatchRequest) -> supervisor::Result<DispatchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DispatchOutcome {
            exit_code: 1,
            raw_output: "error: quota exceeded for this billing period".into(),
            parsed_output: "error: quota exceeded for this billing period".into(),
            new_session_id: None,
            usage: None,
            status: DispatchStatus::Blocked,
            resource_exhausted: true,
        })
    }
}

fn driver_with(provider: Arc<dyn AgentProvider>, store: Arc<dyn StateStore>, config: Config) -> Driver {
    let registry = Arc::new(ProviderRegistry::new(vec![provider]));
    Driver::new(config, store, registry, None, Arc::new(NoopSessionDiscovery), Vec::new(), std::env::temp_dir())
}

fn driver_with_helper(provider: Arc<dyn AgentProvider>, store: Arc<dyn StateStore>, config: Config) -> Driver {
    let registry = Arc::new(ProviderRegistry::new(vec![Arc::clone(&provider)]));
    Driver::new(config, store, registry, Some(provider), Arc::new(NoopSessionDiscovery), Vec::new(), std::env::temp_dir())
}

async fn seed(store: &Arc<dyn StateStore>, config: &Config, task: Task) {
    let repo = StateRepository::new(Arc::clone(store), config.state_store.state_key.clone());
    repo.save(&SupervisorState::new(ExecutionMode::Auto)).await.unwrap();
    let queue = TaskQueueRepository::new(Arc::clone(store), config.state_store.queue_key.clone());
    queue.enqueue(&task).await.unwrap();
}

/// S1: a clean behavioral response completes on the first attempt.
#[tokio::test]
async fn s1_happy_path_completes_on_first_attempt() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let config = Config::default();
    let response = r#"{"status":"completed","response":"done","confidence":"HIGH","reasoning":"clean"}"#;
    let provider = Arc::new(FixedResponseProvider { name: "claude".into(), response: response.into() });
    seed(&store, &config, Task::new("t-001", "Say hello to the user", "claude").with_acceptance_criteria(vec!["greets the user".into()])).await;

    let driver = driver_with(provider, Arc::clone(&store), config.clone());
    let outcome = driver.run_iteration().await.unwrap();
    assert_eq!(outcome, IterationOutcome::Completed { task_id: "t-001".to_string() });

    let repo = StateRepository::new(Arc::clone(&store), config.state_store.state_key.clone());
    let state = repo.load().await.unwrap().unwrap();
    assert_eq!(state.completed_tasks.len(), 1);
    assert_eq!(state.sub_state.iteration, 1);
}

/// S2: repeated validation failures retry up to `default_retry_max`,
/// then the task is blocked rather than retried forever.
#[tokio::test]
async fn s2_retry_then_block_after_exhausting_retries() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let mut config = Config::default();
    config.default_retry_max = 1;
    let provider = Arc::new(AlwaysFailingProvider);
    seed(&store, &config, Task::new("t-002", "Create a config file", "claude").with_acceptance_criteria(vec!["file config.json exists".into()])).await;

    let driver = driver_with(provider, Arc::clone(&store), config.clone());

    let first = driver.run_iteration().await.unwrap();
    assert_eq!(first, IterationOutcome::Retried { task_id: "t-002".to_string() });

    let second = driver.run_iteration().await.unwrap();
    assert_eq!(second, IterationOutcome::Blocked { task_id: "t-002".to_string() });

    let repo = StateRepository::new(Arc::clone(&store), config.state_store.state_key.clone());
    let state = repo.load().await.unwrap().unwrap();
    assert_eq!(state.blocked_tasks.len(), 1);
    assert_eq!(state.blocked_tasks[0].task_id, "t-002");
    assert!(state.current_task.is_none());
    assert!(state.retry_slot.is_none());
}

/// S4: a hedged, non-committal response halts with AMBIGUITY rather
/// than being silently retried.
#[tokio::test]
async fn s4_ambiguous_response_halts_the_supervisor() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let config = Config::default();
    let provider = Arc::new(FixedResponseProvider {
        name: "claude".into(),
        response: "I could maybe add that function, but I'm not fully sure it's needed.".into(),
    });
    seed(&store, &config, Task::new("t-004", "Add a helper function", "claude").with_acceptance_criteria(vec!["helper function exists".into()])).await;

    let driver = driver_with(provider, Arc::clone(&store), config.clone());
    let outcome = driver.run_iteration().await.unwrap();
    assert_eq!(outcome, IterationOutcome::Halted { reason: "AMBIGUITY".to_string() });

    let repo = StateRepository::new(Arc::clone(&store), config.state_store.state_key.clone());
    let state = repo.load().await.unwrap().unwrap();
    assert_eq!(state.sub_state.status, supervisor::domain::state::SupervisorStatus::Halted);

    let second = driver.run_iteration().await.unwrap();
    assert_eq!(second, IterationOutcome::AlreadyHalted { reason: "AMBIGUITY".to_string() });
}

/// S5: a resource-exhaustion signal from the provider schedules a
/// backoff and halts, without consuming a retry slot.
#[tokio::test]
async fn s5_resource_exhaustion_schedules_backoff_and_halts() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let config = Config::default();
    let provider = Arc::new(ResourceExhaustedProvider { calls: AtomicUsize::new(0) });
    seed(&store, &config, Task::new("t-005", "Create a big feature", "claude").with_acceptance_criteria(vec!["feature exists".into()])).await;

    let driver = driver_with(provider, Arc::clone(&store), config.clone());
    let outcome = driver.run_iteration().await.unwrap();
    assert_eq!(outcome, IterationOutcome::Halted { reason: "RESOURCE_EXHAUSTED".to_string() });

    let repo = StateRepository::new(Arc::clone(&store), config.state_store.state_key.clone());
    let state = repo.load().await.unwrap().unwrap();
    assert!(state.sub_state.resource_exhausted_retry.is_some());
    assert!(!state.can_resume(chrono::Utc::now()));
    assert_eq!(state.retry_slot.as_ref().unwrap().task_id, "t-005");
}

/// A provider whose responses are scripted by call order, so a single
/// instance can stand in for both the main task dispatch and the
/// helper-agent dispatches the helper-agent and interrogation
/// strategies make.
struct SequencedProvider {
    responses: Vec<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl AgentProvider for SequencedProvider {
    fn name(&self) -> &str {
        "claude"
    }
    async fn is_available(&self) -> bool {
        true
    }
    async fn dispatch(&self, _request: DispatchRequest) -> supervisor::Result<DispatchOutcome> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.responses.get(index).cloned().unwrap_or_default();
        Ok(DispatchOutcome {
            exit_code: 0,
            raw_output: response.clone(),
            parsed_output: response,
            new_session_id: Some("sid-helper".into()),
            usage: None,
            status: DispatchStatus::Success,
            resource_exhausted: false,
        })
    }
}

/// S3: a coding response with no declared files leaves every criterion
/// UNCERTAIN. The helper-agent strategy declines to confirm, so the
/// pipeline falls through to interrogation, which resolves the one
/// outstanding criterion as COMPLETE in its first round.
#[tokio::test]
async fn s3_interrogation_resolves_after_helper_agent_declines() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let config = Config::default();
    let main_response = r#"{"status":"completed","files_created":[],"files_updated":[],"changes":["added validation"],"neededChanges":false,"reasoning":"implemented","summary":"done"}"#;
    let provider = Arc::new(SequencedProvider {
        responses: vec![
            main_response.to_string(),
            r#"{"confirmed":false,"verification_commands":[]}"#.to_string(),
            "Added the validation function in src/validate.rs".to_string(),
            r#"{"verdicts":[{"criterion":"validation function exists","verdict":"COMPLETE","evidence":"src/validate.rs"}]}"#.to_string(),
        ],
        calls: AtomicUsize::new(0),
    });
    seed(
        &store,
        &config,
        Task::new("t-003", "Implement input validation", "claude").with_acceptance_criteria(vec!["validation function exists".into()]),
    )
    .await;

    let driver = driver_with_helper(provider, Arc::clone(&store), config.clone());
    let outcome = driver.run_iteration().await.unwrap();
    assert_eq!(outcome, IterationOutcome::Completed { task_id: "t-003".to_string() });

    let repo = StateRepository::new(Arc::clone(&store), config.state_store.state_key.clone());
    let state = repo.load().await.unwrap().unwrap();
    assert_eq!(state.completed_tasks.len(), 1);
    assert!(state.completed_tasks[0].report.valid);
}

/// S6: a pre-existing state snapshot with a legacy completed-task
/// record (missing `intent`/`summary`) loads without error and
/// backfills the documented placeholder values.
#[tokio::test]
async fn s6_legacy_completed_task_loads_with_backfill() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let config = Config::default();
    let raw_state = serde_json::json!({
        "sub_state": {"status": "RUNNING", "iteration": 3},
        "goal": null,
        "current_task": null,
        "retry_slot": null,
        "completed_tasks": [{
            "task_id": "t-legacy-1",
            "completed_at": "2024-01-01T00:00:00Z",
            "report": {"valid": true, "confidence": "HIGH"}
        }],
        "blocked_tasks": [],
        "active_sessions": {},
        "queue_exhausted": false,
        "last_updated": "2024-01-01T00:00:00Z",
        "execution_mode": "AUTO"
    });
    store.set(&config.state_store.state_key, raw_state.to_string()).await.unwrap();

    let repo = StateRepository::new(Arc::clone(&store), config.state_store.state_key.clone());
    let state = repo.load().await.unwrap().unwrap();
    assert_eq!(state.completed_tasks.len(), 1);
    let legacy = &state.completed_tasks[0];
    assert_eq!(legacy.intent, "[Legacy] t-legacy-1");
    assert!(!legacy.requires_context);
}
