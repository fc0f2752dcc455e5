use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DispatchStatus {
    Success,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub tokens: Option<u64>,
    pub duration_seconds: Option<f64>,
}

/// One uniform invocation: `dispatch(prompt, working_directory, agent_mode?,
/// session_id?, feature_id?)`.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub prompt: String,
    pub working_directory: std::path::PathBuf,
    pub agent_mode: Option<String>,
    pub session_id: Option<String>,
    pub feature_id: Option<String>,
}

/// The uninterpreted result of one dispatch. The dispatcher never reads
/// the response body for meaning — that is validation's job — but it
/// does surface the resource-exhaustion signal, since recognizing it is
/// a dispatch-layer (provider-specific) concern, not a validation one.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub exit_code: i32,
    pub raw_output: String,
    pub parsed_output: String,
    pub new_session_id: Option<String>,
    pub usage: Option<Usage>,
    pub status: DispatchStatus,
    pub resource_exhausted: bool,
}

/// A named family of agent executables. Implementations are thin
/// subprocess wrappers; the core never speaks a provider-specific
/// protocol beyond this trait.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap local availability check (binary on PATH, circuit not
    /// open) — does not itself dispatch.
    async fn is_available(&self) -> bool;

    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome>;
}
