use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;

/// The ten task classifications the prompt strategy table and validation
/// pipeline key off of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Coding,
    Behavioral,
    Verification,
    Research,
    Testing,
    Orchestration,
    Configuration,
    Documentation,
    Implementation,
    Refactoring,
}

impl TaskType {
    /// Deterministic keyword-based detection over lowercased intent +
    /// instructions, used when a task record omits `task_type`.
    #[must_use]
    pub fn detect(intent: &str, instructions: &str) -> Self {
        let haystack = format!("{intent} {instructions}").to_lowercase();
        if haystack.contains("test") {
            Self::Testing
        } else if haystack.contains("config") || haystack.contains("setup") || haystack.contains("env") {
            Self::Configuration
        } else if haystack.contains("document") || haystack.contains("readme") || haystack.contains("guide") {
            Self::Documentation
        } else if haystack.contains("refactor") || haystack.contains("improve") || haystack.contains("clean") {
            Self::Refactoring
        } else if haystack.contains("greet") || haystack.contains("hello") || haystack.contains("say") || haystack.contains("respond") {
            Self::Behavioral
        } else if haystack.contains("verify") || haystack.contains("check") || haystack.contains("audit") || haystack.contains("analyze") || haystack.contains("confirm") {
            Self::Verification
        } else {
            Self::Coding
        }
    }

    /// Whether this task type belongs to the "coding family" eligible for
    /// the helper-agent validation strategy.
    #[must_use]
    pub fn is_coding_family(self) -> bool {
        matches!(
            self,
            Self::Coding
                | Self::Configuration
                | Self::Documentation
                | Self::Testing
                | Self::Refactoring
                | Self::Implementation
                | Self::Orchestration
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
}

/// An enqueued unit of work. Immutable once in the queue: nothing in the
/// supervisor core mutates a `Task` in place — it is read, copied into a
/// completed/blocked record, and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub intent: String,
    pub instructions: String,
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    pub provider: String,
    #[serde(default)]
    pub agent_mode: Option<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub meta: TaskMeta,
}

impl Task {
    #[must_use]
    pub fn new(task_id: impl Into<String>, intent: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            intent: intent.into(),
            instructions: String::new(),
            acceptance_criteria: Vec::new(),
            task_type: None,
            provider: provider.into(),
            agent_mode: None,
            working_directory: None,
            retry_policy: None,
            meta: TaskMeta::default(),
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn with_acceptance_criteria(mut self, criteria: Vec<String>) -> Self {
        self.acceptance_criteria = criteria;
        self
    }

    /// Resolves the effective task type: explicit if set, else detected
    /// from intent and instructions.
    #[must_use]
    pub fn effective_task_type(&self) -> TaskType {
        self.task_type
            .unwrap_or_else(|| TaskType::detect(&self.intent, &self.instructions))
    }

    /// The feature identifier a dispatch for this task should use:
    /// explicit meta, else the part of `task_id` before the first `-`
    /// or `/`, else falls back to the caller-supplied project id.
    #[must_use]
    pub fn feature_id(&self, project_id: &str) -> String {
        if let Some(id) = &self.meta.feature_id {
            return id.clone();
        }
        if let Some(prefix) = self.task_id.split(['-', '/']).next() {
            if !prefix.is_empty() && prefix != self.task_id {
                return prefix.to_string();
            }
        }
        project_id.to_string()
    }

    /// Validates an enqueue-time task record against the task schema.
    /// Rejection here never halts the supervisor (`TaskSchemaInvalid` is
    /// an enqueue-time-only error).
    pub fn validate_schema(&self) -> Result<(), SupervisorError> {
        if self.task_id.trim().is_empty() {
            return Err(SupervisorError::TaskSchemaInvalid("task_id must not be empty".into()));
        }
        if self.intent.trim().is_empty() {
            return Err(SupervisorError::TaskSchemaInvalid("intent must not be empty".into()));
        }
        if self.acceptance_criteria.is_empty() {
            return Err(SupervisorError::TaskSchemaInvalid(format!(
                "task {} has no acceptance criteria",
                self.task_id
            )));
        }
        if self.provider.trim().is_empty() {
            return Err(SupervisorError::TaskSchemaInvalid(format!(
                "task {} has no provider",
                self.task_id
            )));
        }
        Ok(())
    }
}

/// Snapshot recorded on task completion (success or failure-to-block is
/// recorded separately as a `BlockedTask`).
#[derive(Debug, Clone, Serialize)]
pub struct CompletedTask {
    pub task_id: String,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub intent: String,
    pub summary: String,
    pub requires_context: bool,
    pub report: crate::domain::validation::ValidationReport,
}

/// Raw on-disk shape, permissive about the fields legacy records lack.
/// `CompletedTask`'s `Deserialize` impl backfills through this shape so
/// that loading a pre-existing state snapshot never fails merely
/// because it predates the `intent`/`summary` fields (spec round-trip
/// law: legacy entries load with `intent == "[Legacy] <task_id>"` and
/// `requires_context == false`).
#[derive(Deserialize)]
struct RawCompletedTask {
    task_id: String,
    completed_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    requires_context: Option<bool>,
    report: crate::domain::validation::ValidationReport,
}

impl<'de> Deserialize<'de> for CompletedTask {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawCompletedTask::deserialize(deserializer)?;
        let is_legacy = raw.intent.is_none();
        Ok(Self {
            intent: raw.intent.unwrap_or_else(|| format!("[Legacy] {}", raw.task_id)),
            summary: raw.summary.unwrap_or_default(),
            requires_context: if is_legacy { false } else { raw.requires_context.unwrap_or(true) },
            task_id: raw.task_id,
            completed_at: raw.completed_at,
            report: raw.report,
        })
    }
}

impl CompletedTask {
    /// Builds the deterministic summary: first sentence of intent,
    /// truncated to 60 chars with a `...` suffix if cut.
    #[must_use]
    pub fn success_summary(intent: &str) -> String {
        let first_sentence = intent.split('.').next().unwrap_or(intent).trim();
        if first_sentence.chars().count() > 60 {
            let truncated: String = first_sentence.chars().take(60).collect();
            format!("Completed: {truncated}...")
        } else {
            format!("Completed: {first_sentence}")
        }
    }

    #[must_use]
    pub fn failure_summary(reason: Option<&str>) -> String {
        format!("Failed: {}", reason.unwrap_or("Unknown reason"))
    }

    /// Synthesizes a legacy-record stand-in used when a stored entry
    /// predates the `intent`/`summary` fields.
    #[must_use]
    pub fn legacy(task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self {
            intent: format!("[Legacy] {task_id}"),
            summary: String::new(),
            requires_context: false,
            completed_at: chrono::Utc::now(),
            report: crate::domain::validation::ValidationReport::trivial_pass(),
            task_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedTask {
    pub task_id: String,
    pub blocked_at: chrono::DateTime<chrono::Utc>,
    pub reason: String,
}
