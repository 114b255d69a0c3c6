//! Shell tool: `run_cmd`.
//!
//! Commands run through `sh -c` in the workspace directory.  Each run is
//! bounded by a timeout (the child is killed when it expires) and each
//! output stream is capped at [`MAX_OUTPUT_BYTES`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use threadloop_agent::{Tool, ToolDefinition};
use tracing::{debug, warn};

use crate::error::{AdapterError, Result};

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum bytes kept from stdout and from stderr.
pub const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Runs a shell command and reports exit code, stdout and stderr.
#[derive(Debug, Clone)]
pub struct RunCmdTool {
    working_dir: PathBuf,
    timeout_secs: u64,
}

impl RunCmdTool {
    pub const NAME: &'static str = "run_cmd";

    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    async fn run(&self, args: &Value) -> Result<String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::InvalidParams {
                tool_name: Self::NAME.into(),
                reason: "missing required string field `command`".into(),
            })?;

        debug!(
            command,
            working_dir = %self.working_dir.display(),
            timeout_secs = self.timeout_secs,
            "executing shell command"
        );

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdapterError::ExecutionFailed {
                tool_name: Self::NAME.into(),
                reason: format!("failed to spawn process: {e}"),
            })?;

        // On timeout the child is dropped and killed.
        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AdapterError::ExecutionFailed {
                    tool_name: Self::NAME.into(),
                    reason: format!("process error: {e}"),
                });
            }
            Err(_) => {
                warn!(command, timeout_secs = self.timeout_secs, "command timed out");
                return Err(AdapterError::Timeout {
                    seconds: self.timeout_secs,
                    reason: format!("shell command `{command}` exceeded time limit"),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = truncate_output(&output.stdout);
        let stderr = truncate_output(&output.stderr);
        debug!(exit_code, "command completed");

        Ok(format!(
            "exit code: {exit_code}\nstdout:\n{stdout}\nstderr:\n{stderr}"
        ))
    }
}

/// Lossy UTF-8 conversion capped at [`MAX_OUTPUT_BYTES`].
fn truncate_output(raw: &[u8]) -> String {
    if raw.len() <= MAX_OUTPUT_BYTES {
        String::from_utf8_lossy(raw).into_owned()
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        s
    }
}

#[async_trait]
impl Tool for RunCmdTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: "Run a shell command and return its exit code, stdout and stderr.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Command line passed to `sh -c`"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> threadloop_agent::Result<String> {
        self.run(&arguments)
            .await
            .map_err(|e| e.into_agent_error(Self::NAME))
    }
}
