//! The operator-facing command surface. Thin clap-derived handlers:
//! each one loads state, performs exactly the mutation its name
//! promises, persists, and reports — no handler contains control-loop
//! logic, that lives in `application::driver`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};

use crate::application::driver::Driver;
use crate::application::repository::{StateRepository, TaskQueueRepository};
use crate::application::session_manager::NoopSessionDiscovery;
use crate::config::Config;
use crate::domain::goal::Goal;
use crate::domain::state::{ExecutionMode, SupervisorState};
use crate::domain::task::Task;
use crate::error::{Result, SupervisorError};
use crate::infrastructure::providers::registry::ProviderRegistry;
use crate::infrastructure::providers::{SubprocessAgentProvider, SubprocessProviderConfig};
use crate::ports::StateStore;

#[derive(Debug, Parser)]
#[command(name = "supervisor", version, about = "Deterministic control loop for external code-generation agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExecutionModeArg {
    Auto,
    Manual,
}

impl From<ExecutionModeArg> for ExecutionMode {
    fn from(value: ExecutionModeArg) -> Self {
        match value {
            ExecutionModeArg::Auto => Self::Auto,
            ExecutionModeArg::Manual => Self::Manual,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Creates a fresh supervisor state at the configured key. Refuses
    /// to overwrite an existing state.
    InitState {
        #[arg(long, value_enum, default_value = "auto")]
        execution_mode: ExecutionModeArg,
    },
    /// Sets (or replaces) the operator-provided goal.
    SetGoal {
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        description: String,
    },
    /// Enqueues the task described by a JSON file.
    Enqueue {
        #[arg(long)]
        task_file: PathBuf,
    },
    /// Halts the supervisor immediately with an operator-supplied reason.
    Halt {
        #[arg(long)]
        reason: String,
    },
    /// Resumes a halted supervisor, refusing while a resource-exhausted
    /// backoff has not yet elapsed.
    Resume,
    /// Prints a table of the current status.
    Status,
    /// Prints a table of queue depth, completion/blocked counts, and
    /// per-provider health.
    Metrics,
    /// Runs the control loop until halted or completed.
    Start,
}

pub async fn run(cli: Cli, config: Config, state_store: Arc<dyn StateStore>) -> Result<i32> {
    let state_repo = StateRepository::new(Arc::clone(&state_store), config.state_store.state_key.clone());
    let queue_repo = TaskQueueRepository::new(Arc::clone(&state_store), config.state_store.queue_key.clone());

    match cli.command {
        Command::InitState { execution_mode } => init_state(&state_repo, execution_mode.into()).await,
        Command::SetGoal { project_id, description } => set_goal(&state_repo, project_id, description).await,
        Command::Enqueue { task_file } => enqueue(&queue_repo, &task_file).await,
        Command::Halt { reason } => halt(&state_repo, reason).await,
        Command::Resume => resume(&state_repo).await,
        Command::Status => status(&state_repo, &queue_repo).await,
        Command::Metrics => metrics(&config, &state_repo, &queue_repo).await,
        Command::Start => start(config, state_store).await,
    }
}

async fn init_state(repo: &StateRepository, execution_mode: ExecutionMode) -> Result<i32> {
    if repo.exists().await? {
        eprintln!("supervisor state already exists; refusing to overwrite");
        return Ok(1);
    }
    repo.save(&SupervisorState::new(execution_mode)).await?;
    println!("initialized supervisor state in {execution_mode:?} mode");
    Ok(0)
}

async fn set_goal(repo: &StateRepository, project_id: String, description: String) -> Result<i32> {
    let mut state = load_or_fail(repo).await?;
    state.goal = Some(Goal::new(project_id, description));
    state.touch();
    repo.save(&state).await?;
    println!("goal set");
    Ok(0)
}

async fn enqueue(queue: &TaskQueueRepository, task_file: &PathBuf) -> Result<i32> {
    let raw = std::fs::read_to_string(task_file).map_err(SupervisorError::IoFailure)?;
    let task: Task = serde_json::from_str(&raw).map_err(|e| SupervisorError::TaskSchemaInvalid(e.to_string()))?;
    task.validate_schema()?;
    queue.enqueue(&task).await?;
    println!("enqueued task {}", task.task_id);
    Ok(0)
}

async fn halt(repo: &StateRepository, reason: String) -> Result<i32> {
    let mut state = load_or_fail(repo).await?;
    state.halt(reason, None);
    repo.save(&state).await?;
    println!("halted");
    Ok(0)
}

async fn resume(repo: &StateRepository) -> Result<i32> {
    let mut state = load_or_fail(repo).await?;
    if !state.can_resume(chrono::Utc::now()) {
        eprintln!("cannot resume: not halted, or resource-exhausted backoff has not elapsed");
        return Ok(1);
    }
    state.resume();
    repo.save(&state).await?;
    println!("resumed");
    Ok(0)
}

async fn status(repo: &StateRepository, queue: &TaskQueueRepository) -> Result<i32> {
    let state = load_or_fail(repo).await?;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["field", "value"]);
    table.add_row(vec!["status".to_string(), format!("{:?}", state.sub_state.status)]);
    table.add_row(vec!["execution_mode".to_string(), format!("{:?}", state.execution_mode)]);
    table.add_row(vec!["iteration".to_string(), state.sub_state.iteration.to_string()]);
    table.add_row(vec!["current_task".to_string(), state.current_task.as_ref().map_or_else(|| "-".to_string(), |t| t.task_id.clone())]);
    table.add_row(vec!["queue_depth".to_string(), queue.len().await?.to_string()]);
    table.add_row(vec!["completed_tasks".to_string(), state.completed_tasks.len().to_string()]);
    table.add_row(vec!["blocked_tasks".to_string(), state.blocked_tasks.len().to_string()]);
    table.add_row(vec!["halt_reason".to_string(), state.sub_state.halt_reason.unwrap_or_else(|| "-".to_string())]);
    println!("{table}");
    Ok(0)
}

async fn metrics(config: &Config, repo: &StateRepository, queue: &TaskQueueRepository) -> Result<i32> {
    let state = load_or_fail(repo).await?;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["metric", "value"]);
    table.add_row(vec!["queue_depth".to_string(), queue.len().await?.to_string()]);
    table.add_row(vec!["completed_total".to_string(), state.completed_tasks.len().to_string()]);
    table.add_row(vec!["blocked_total".to_string(), state.blocked_tasks.len().to_string()]);
    table.add_row(vec!["active_sessions".to_string(), state.active_sessions.len().to_string()]);
    table.add_row(vec!["iteration".to_string(), state.sub_state.iteration.to_string()]);
    table.add_row(vec!["retry_counters_tracked".to_string(), state.sub_state.retry_counts.len().to_string()]);
    for name in &config.provider_priority {
        table.add_row(vec![format!("provider:{name}:configured"), "true".to_string()]);
    }
    println!("{table}");
    Ok(0)
}

async fn start(config: Config, state_store: Arc<dyn StateStore>) -> Result<i32> {
    let providers: Vec<Arc<dyn crate::ports::agent_provider::AgentProvider>> = config
        .provider_priority
        .iter()
        .map(|name| {
            Arc::new(SubprocessAgentProvider::new(SubprocessProviderConfig {
                name: name.clone(),
                executable: name.clone(),
                extra_args: Vec::new(),
                resource_exhausted_patterns: vec!["quota".to_string(), "rate limit".to_string(), "resource_exhausted".to_string()],
                timeout: std::time::Duration::from_secs(config.dispatch_timeout_seconds),
            })) as Arc<dyn crate::ports::agent_provider::AgentProvider>
        })
        .collect();
    let helper_agent = providers.first().cloned();
    let registry = Arc::new(ProviderRegistry::new(providers));

    let sandbox_root = config.sandbox_root.clone();
    std::fs::create_dir_all(&sandbox_root).map_err(SupervisorError::IoFailure)?;

    let catalog = crate::infrastructure::rule_catalog::load(config.rule_catalog_path.as_deref())?;

    let driver = Driver::new(config, state_store, registry, helper_agent, Arc::new(NoopSessionDiscovery), catalog, sandbox_root);
    driver.run_forever().await?;
    Ok(0)
}

async fn load_or_fail(repo: &StateRepository) -> Result<SupervisorState> {
    repo.load()
        .await?
        .ok_or_else(|| SupervisorError::Internal("supervisor state not initialized; run init-state first".into()))
}
