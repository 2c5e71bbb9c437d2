//! workspace_shell: run a command inside a task's workspace directory,
//! bounded by a timeout and an output-size cap. Cooperative cancellation
//! kills the child process as soon as the cancel token flips.

use crate::ToolHandle;
use ao_domain::cancel::CancelToken;
use ao_domain::error::{Error, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

pub struct WorkspaceShellTool {
    task_dir: PathBuf,
    timeout: Duration,
    output_cap_chars: usize,
}

impl WorkspaceShellTool {
    pub fn new(task_dir: PathBuf, timeout_secs: u64, output_cap_chars: usize) -> Self {
        Self {
            task_dir,
            timeout: Duration::from_secs(timeout_secs),
            output_cap_chars,
        }
    }

    fn truncate(&self, mut output: String) -> String {
        if output.len() > self.output_cap_chars {
            let keep = self.output_cap_chars * 3 / 4;
            let drain_count = output.len() - keep;
            let mut boundary = drain_count;
            while boundary < output.len() && !output.is_char_boundary(boundary) {
                boundary += 1;
            }
            output.drain(..boundary);
            output = format!("...[truncated]...\n{output}");
        }
        output
    }
}

#[async_trait::async_trait]
impl ToolHandle for WorkspaceShellTool {
    fn name(&self) -> &str {
        "workspace_shell"
    }

    fn description(&self) -> &str {
        "Run a shell command with the task workspace as the working directory."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "command": { "type": "string" } },
            "required": ["command"]
        })
    }

    async fn invoke(&self, args: Value, cancel: CancelToken) -> Result<String> {
        let command = args["command"].as_str().ok_or_else(|| Error::Other("workspace_shell: missing 'command'".into()))?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.task_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| Error::Other(format!("workspace_shell: failed to spawn: {e}")))?;

        let wait = async {
            loop {
                if cancel.is_cancelled() {
                    let _ = child.kill().await;
                    return Err(Error::Cancelled);
                }
                match child.try_wait() {
                    Ok(Some(_status)) => break,
                    Ok(None) => tokio::time::sleep(Duration::from_millis(50)).await,
                    Err(e) => return Err(Error::Other(format!("workspace_shell: wait failed: {e}"))),
                }
            }
            Ok(())
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::Timeout(format!("workspace_shell: command exceeded {:?}", self.timeout)));
            }
        }

        let output = child.wait_with_output().await.map_err(|e| Error::Other(format!("workspace_shell: {e}")))?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        combined = self.truncate(combined);

        Ok(format!("exit_code={}\n{combined}", output.status.code().unwrap_or(-1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn runs_a_command_and_captures_output() {
        let dir = tempdir().unwrap();
        let tool = WorkspaceShellTool::new(dir.path().to_path_buf(), 5, 10_000);
        let result = tool.invoke(serde_json::json!({"command": "echo hi"}), CancelToken::new()).await.unwrap();
        assert!(result.contains("exit_code=0"));
        assert!(result.contains("hi"));
    }

    #[tokio::test]
    async fn cancellation_before_start_stops_the_command() {
        let dir = tempdir().unwrap();
        let tool = WorkspaceShellTool::new(dir.path().to_path_buf(), 5, 10_000);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = tool.invoke(serde_json::json!({"command": "sleep 5"}), cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
