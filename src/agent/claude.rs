use super::stream::StreamSummary;
use super::{Agent, AgentRequest, AgentResponse};
use crate::config::Config;
use crate::errors::AgentError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receives short activity notes (text snippets, tool uses) while the agent runs.
pub type ActivityCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs the `claude` CLI once per request, prompt on stdin, stream-json on stdout.
#[derive(Clone)]
pub struct ClaudeAgent {
    program: String,
    leading_args: Vec<String>,
    skip_permissions: bool,
    working_dir: Option<PathBuf>,
    activity: Option<ActivityCallback>,
}

impl std::fmt::Debug for ClaudeAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeAgent")
            .field("program", &self.program)
            .field("leading_args", &self.leading_args)
            .field("skip_permissions", &self.skip_permissions)
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

impl ClaudeAgent {
    /// `command` may carry leading arguments, e.g. `npx claude`.
    pub fn new(command: &str, skip_permissions: bool) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "claude".to_string());
        Self {
            program,
            leading_args: parts.collect(),
            skip_permissions,
            working_dir: None,
            activity: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.claude_cmd, config.skip_permissions).with_working_dir(config.project_dir.clone())
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_activity(mut self, callback: ActivityCallback) -> Self {
        self.activity = Some(callback);
        self
    }

    /// Arguments passed after the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.leading_args.clone();
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.extend(
            ["--print", "--output-format", "stream-json", "--verbose"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }

    fn command_display(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Agent for ClaudeAgent {
    async fn invoke(
        &self,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            command: self.command_display(),
            source,
        })?;
        debug!(
            phase = %request.phase,
            pid = child.id().unwrap_or(0),
            prompt_chars = request.prompt.len(),
            "Spawned agent process"
        );

        // Written from a task so a large prompt cannot block reading stdout.
        let stdin = child.stdin.take();
        let prompt = request.prompt.clone();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("agent stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("agent stderr was not captured"))?;

        let activity = self.activity.clone();
        let stdout_task = tokio::spawn(async move {
            let mut summary = StreamSummary::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(note) = summary.feed_line(&line)
                    && let Some(callback) = &activity
                {
                    callback(&note);
                }
            }
            Ok::<StreamSummary, std::io::Error>(summary)
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
            buf
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                warn!(phase = %request.phase, "Cancelling agent process");
                let _ = child.kill().await;
                stdin_task.abort();
                stdout_task.abort();
                stderr_task.abort();
                return Err(AgentError::Cancelled);
            }
        };

        if let Ok(Err(e)) = stdin_task.await {
            debug!(error = %e, "Agent closed stdin early");
        }

        let summary = tokio::select! {
            joined = stdout_task => joined.map_err(std::io::Error::other)??,
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        };
        let stderr_text = stderr_task.await.unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1);
        debug!(phase = %request.phase, exit_code, "Agent process exited");

        if !status.success() {
            let message = stderr_text.trim();
            return Err(AgentError::NonZeroExit {
                exit_code,
                message: if message.is_empty() {
                    "Claude Code execution failed".to_string()
                } else {
                    message.to_string()
                },
            });
        }
        if let Some(error) = summary.error() {
            return Err(AgentError::Reported(error.to_string()));
        }

        Ok(summary.finish())
    }
}
