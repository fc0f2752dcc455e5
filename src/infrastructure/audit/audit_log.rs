use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// The event names the audit log records, one per iteration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    TaskCompleted,
    TaskBlocked,
    Halt,
    QueueExhausted,
    StateTransition,
}

/// A short preview of a long text blob, kept in the audit entry instead
/// of the full content (the full content belongs in the prompt log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    pub text: String,
    pub length: usize,
}

/// First 500 characters of `text`, alongside its full length.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> Preview {
    let truncated: String = text.chars().take(max_chars).collect();
    Preview {
        text: truncated,
        length: text.chars().count(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub iteration: u64,
    pub event: AuditEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub state_diff: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<Preview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<Preview>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(iteration: u64, event: AuditEvent, state_diff: serde_json::Value) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            iteration,
            event,
            task_id: None,
            tool: None,
            state_diff,
            validation_summary: None,
            prompt_preview: None,
            response_preview: None,
        }
    }

    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    #[must_use]
    pub fn with_validation_summary(mut self, summary: impl Into<String>) -> Self {
        self.validation_summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn with_previews(mut self, prompt: &str, response: &str) -> Self {
        self.prompt_preview = Some(preview(prompt, 500));
        self.response_preview = Some(preview(response, 500));
        self
    }
}

/// Append-only `audit.log.jsonl` writer. Never rewritten or compacted;
/// created on demand, so a missing file is not an error.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    #[must_use]
    pub fn new(sandbox_project_dir: &Path) -> Self {
        Self {
            path: sandbox_project_dir.join("audit.log.jsonl"),
        }
    }

    pub async fn append(&self, entry: &AuditEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry).expect("AuditEntry serialization is infallible");
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Appends the entry, swallowing failures to stderr rather than
    /// propagating them: audit-append failures are non-blocking per the
    /// error-handling design.
    pub async fn append_best_effort(&self, entry: &AuditEntry) {
        if let Err(err) = self.append(entry).await {
            eprintln!("audit log append failed: {err}");
        }
    }
}
