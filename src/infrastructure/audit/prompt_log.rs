use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// Content above this size is truncated with a literal marker.
pub const TRUNCATION_THRESHOLD_BYTES: usize = 100 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptKind {
    Prompt,
    Response,
    FixPrompt,
    ClarificationPrompt,
    InterrogationPrompt,
    InterrogationResponse,
    HelperAgentPrompt,
    HelperAgentResponse,
    GoalCompletionCheck,
    GoalCompletionResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PromptLogMetadata {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_length: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PromptLogEntry {
    timestamp: chrono::DateTime<chrono::Utc>,
    kind: PromptKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
    content: String,
    metadata: PromptLogMetadata,
}

/// Truncates `content` to the threshold if it exceeds it, appending the
/// literal marker the testable-properties section requires. Byte length
/// (not char count) is what the threshold and the marker's `N` refer
/// to, and truncation respects UTF-8 char boundaries.
fn truncate_if_needed(content: &str) -> (String, bool, Option<usize>) {
    let original_len = content.len();
    if original_len <= TRUNCATION_THRESHOLD_BYTES {
        return (content.to_string(), false, None);
    }
    let mut cut = TRUNCATION_THRESHOLD_BYTES;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = content[..cut].to_string();
    truncated.push_str(&format!("\n\n[TRUNCATED: {original_len} bytes total]"));
    (truncated, true, Some(original_len))
}

/// Append-only `logs/prompts.log.jsonl` writer: one entry per prompt or
/// response emitted by any pipeline stage.
pub struct PromptLog {
    path: PathBuf,
}

impl PromptLog {
    #[must_use]
    pub fn new(sandbox_project_dir: &Path) -> Self {
        Self {
            path: sandbox_project_dir.join("logs").join("prompts.log.jsonl"),
        }
    }

    pub async fn append(&self, kind: PromptKind, task_id: Option<&str>, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let (stored_content, truncated, original_length) = truncate_if_needed(content);
        let entry = PromptLogEntry {
            timestamp: chrono::Utc::now(),
            kind,
            task_id: task_id.map(str::to_string),
            content: stored_content,
            metadata: PromptLogMetadata { truncated, original_length },
        };
        let mut line = serde_json::to_string(&entry).expect("PromptLogEntry serialization is infallible");
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    pub async fn append_best_effort(&self, kind: PromptKind, task_id: Option<&str>, content: &str) {
        if let Err(err) = self.append(kind, task_id, content).await {
            eprintln!("prompt log append failed: {err}");
        }
    }
}
