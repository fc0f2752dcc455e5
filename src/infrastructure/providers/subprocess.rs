use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::{Result, SupervisorError};
use crate::ports::agent_provider::{AgentProvider, DispatchOutcome, DispatchRequest, DispatchStatus, Usage};

/// Configuration for one opaque agent executable. The supervisor never
/// speaks a provider-specific protocol beyond command-line flags and
/// stdin/stdout text, matching the "common invocation contract" the
/// purpose statement reserves for the core.
#[derive(Debug, Clone)]
pub struct SubprocessProviderConfig {
    pub name: String,
    pub executable: String,
    pub extra_args: Vec<String>,
    /// Case-insensitive substrings in stdout/stderr that signal a
    /// provider quota has been exhausted. Left as a configurable
    /// predicate rather than hard-coded strings, since the exact
    /// per-provider vocabulary is not standardized.
    pub resource_exhausted_patterns: Vec<String>,
    pub timeout: Duration,
}

/// A provider wrapper that shells out to `executable`, piping the
/// prompt over stdin and reading the full response from stdout. Session
/// continuity and agent-mode selection are passed as command-line
/// flags; which flags a given executable actually honors is outside
/// this crate's scope — only the shape of the call is specified here.
pub struct SubprocessAgentProvider {
    config: SubprocessProviderConfig,
}

impl SubprocessAgentProvider {
    #[must_use]
    pub fn new(config: SubprocessProviderConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, request: &DispatchRequest) -> Result<Command> {
        if !request.working_directory.is_dir() {
            return Err(SupervisorError::Internal(format!(
                "working directory {} does not exist or is not a directory",
                request.working_directory.display()
            )));
        }
        let mut command = Command::new(&self.config.executable);
        command.current_dir(&request.working_directory);
        command.args(&self.config.extra_args);
        if let Some(mode) = &request.agent_mode {
            command.arg("--mode").arg(mode);
        }
        if let Some(session_id) = &request.session_id {
            command.arg("--session").arg(session_id);
        }
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        Ok(command)
    }

    fn detect_resource_exhaustion(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.config
            .resource_exhausted_patterns
            .iter()
            .any(|pattern| lower.contains(&pattern.to_lowercase()))
    }
}

#[async_trait]
impl AgentProvider for SubprocessAgentProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn is_available(&self) -> bool {
        which_on_path(&self.config.executable)
    }

    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome> {
        let mut command = self.build_command(&request)?;

        tracing::info!(provider = %self.config.name, cwd = %request.working_directory.display(), "dispatching to agent provider");

        let mut child = command.spawn().map_err(SupervisorError::IoFailure)?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        let prompt = request.prompt.clone();
        let write_task = tokio::spawn(async move {
            let _ = stdin.write_all(prompt.as_bytes()).await;
            drop(stdin);
        });

        let run = async {
            let _ = write_task.await;
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut out) = child.stdout.take() {
                let _ = out.read_to_string(&mut stdout).await;
            }
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr).await;
            }
            let status = child.wait().await.map_err(SupervisorError::IoFailure)?;
            Ok::<_, SupervisorError>((status, stdout, stderr))
        };

        let outcome = match tokio::time::timeout(self.config.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(provider = %self.config.name, "dispatch timed out; terminating child");
                if let Some(id) = child.id() {
                    let _ = signal::kill(Pid::from_raw(id as i32), Signal::SIGTERM);
                }
                let _ = child.wait().await;
                return Err(SupervisorError::ProviderTransient(format!(
                    "{} dispatch exceeded {:?} timeout",
                    self.config.name, self.config.timeout
                )));
            }
        };

        let (status, stdout, stderr) = outcome;
        let exit_code = status.code().unwrap_or(-1);
        let combined = format!("{stdout}{stderr}");
        let resource_exhausted = self.detect_resource_exhaustion(&combined);

        let dispatch_status = if resource_exhausted {
            DispatchStatus::Blocked
        } else if exit_code == 0 {
            DispatchStatus::Success
        } else {
            DispatchStatus::Failed
        };

        tracing::debug!(provider = %self.config.name, exit_code, resource_exhausted, "dispatch completed");

        Ok(DispatchOutcome {
            exit_code,
            raw_output: combined,
            parsed_output: stdout,
            new_session_id: None,
            usage: Some(Usage::default()),
            status: dispatch_status,
            resource_exhausted,
        })
    }
}

fn which_on_path(executable: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(executable);
                candidate.is_file()
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SubprocessProviderConfig {
        SubprocessProviderConfig {
            name: "echo-provider".into(),
            executable: "cat".into(),
            extra_args: vec![],
            resource_exhausted_patterns: vec!["quota exceeded".into()],
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn detects_resource_exhaustion_case_insensitively() {
        let provider = SubprocessAgentProvider::new(config());
        assert!(provider.detect_resource_exhaustion("Error: QUOTA EXCEEDED for today"));
        assert!(!provider.detect_resource_exhaustion("all good"));
    }

    #[tokio::test]
    async fn dispatch_rejects_missing_working_directory() {
        let provider = SubprocessAgentProvider::new(config());
        let request = DispatchRequest {
            prompt: "hi".into(),
            working_directory: std::path::PathBuf::from("/nonexistent/path/for/sure"),
            agent_mode: None,
            session_id: None,
            feature_id: None,
        };
        let result = provider.dispatch(request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dispatch_pipes_stdin_to_stdout_via_cat() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SubprocessAgentProvider::new(config());
        let request = DispatchRequest {
            prompt: "hello world".into(),
            working_directory: dir.path().to_path_buf(),
            agent_mode: None,
            session_id: None,
            feature_id: None,
        };
        let outcome = provider.dispatch(request).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.parsed_output, "hello world");
        assert_eq!(outcome.status, DispatchStatus::Success);
    }
}
