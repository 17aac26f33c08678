use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use taskweave_core::executor::{TaskContext, TaskRunner};
use taskweave_core::model::TaskNode;
use tokio::process::Command;

/// Environment variable carrying the task context as JSON.
pub const CONTEXT_ENV: &str = "TASKWEAVE_CONTEXT";
pub const TASK_ID_ENV: &str = "TASKWEAVE_TASK_ID";

/// Runs the node's `"command"` metadata through the shell.
///
/// An optional `"timeout_secs"` entry bounds the run. The result is
/// `{exit_code, stdout, stderr}`; a non-zero exit or a timeout fails the task.
pub struct CommandRunner {
    shell: String,
    working_dir: Option<PathBuf>,
    default_timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            working_dir: None,
            default_timeout: None,
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Applied when a node carries no `"timeout_secs"` of its own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    fn timeout_for(&self, node: &TaskNode) -> Option<Duration> {
        node.metadata
            .get("timeout_secs")
            .and_then(Value::as_f64)
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
            .or(self.default_timeout)
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunner for CommandRunner {
    async fn run(&self, node: &TaskNode, context: &TaskContext) -> Result<Value> {
        let command = node
            .metadata
            .get("command")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow!("task {} has no \"command\" metadata", node.id))?;

        let context_json = serde_json::to_string(&context.to_map())?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .env(CONTEXT_ENV, context_json)
            .env(TASK_ID_ENV, &node.id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(task_id = %node.id, command, "spawning command");
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {} for task {}", self.shell, node.id))?;

        let output = match self.timeout_for(node) {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| anyhow!("command timed out after {:.1}s", limit.as_secs_f64()))??,
            None => child.wait_with_output().await?,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        if !output.status.success() {
            if stderr.is_empty() {
                anyhow::bail!("command exited with code {exit_code}");
            }
            anyhow::bail!("command exited with code {exit_code}: {stderr}");
        }

        Ok(json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use taskweave_core::executor::Coordinator;
    use taskweave_core::model::{ExecutionStrategy, TaskSpec, TaskTreeBuilder};

    fn node(command: &str) -> TaskNode {
        TaskNode::new("1", "cmd", 1.0).with_metadata("command", command)
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let runner = CommandRunner::new();
        let result = runner
            .run(&node("echo hello; echo warn >&2"), &TaskContext::default())
            .await
            .unwrap();

        assert_eq!(
            result,
            json!({"exit_code": 0, "stdout": "hello", "stderr": "warn"})
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let runner = CommandRunner::new();
        let err = runner
            .run(&node("echo broken >&2; exit 3"), &TaskContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "command exited with code 3: broken");
    }

    #[tokio::test]
    async fn test_missing_command_fails() {
        let runner = CommandRunner::new();
        let err = runner
            .run(&TaskNode::new("7", "nothing", 1.0), &TaskContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("task 7"));
    }

    #[tokio::test]
    async fn test_timeout_fails() {
        let runner = CommandRunner::new();
        let slow = node("sleep 5").with_metadata("timeout_secs", 0.2);
        let err = runner.run(&slow, &TaskContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        let runner = CommandRunner::new().with_default_timeout(Duration::from_millis(200));
        assert!(runner
            .run(&node("sleep 5"), &TaskContext::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_context_is_exported() {
        let mut context = TaskContext {
            session_id: "s-9".into(),
            phase_id: 2,
            ..Default::default()
        };
        context
            .dependency_results
            .insert("1".into(), json!({"stdout": "42"}));

        let runner = CommandRunner::new();
        let result = runner
            .run(&node("printf '%s' \"$TASKWEAVE_CONTEXT\""), &context)
            .await
            .unwrap();

        let stdout = result["stdout"].as_str().unwrap();
        let exported: Value = serde_json::from_str(stdout).unwrap();
        assert_eq!(exported["session_id"], json!("s-9"));
        assert_eq!(exported["dependency_results"]["1"]["stdout"], json!("42"));
    }

    #[tokio::test]
    async fn test_pipeline_through_coordinator() {
        let tree = TaskTreeBuilder::new("cmd-run", "count words")
            .strategy(ExecutionStrategy::Sequential)
            .task(TaskSpec::new("1", "produce").meta("command", "echo one two three"))
            .task(
                TaskSpec::new("2", "consume")
                    .depends_on(["1"])
                    .meta(
                        "command",
                        "printf '%s' \"$TASKWEAVE_CONTEXT\" | grep -c 'one two three'",
                    ),
            )
            .task(
                TaskSpec::new("3", "fail")
                    .depends_on(["2"])
                    .meta("command", "exit 1"),
            )
            .build()
            .unwrap();

        let coordinator = Coordinator::builder(Arc::new(CommandRunner::new())).build();
        let result = coordinator.execute(tree).await;

        assert!(!result.success);
        assert_eq!(result.results["2"]["stdout"], json!("1"));
        assert_eq!(result.failures["3"], "command exited with code 1");
        assert_eq!(result.summary.counts.completed, 2);
        assert_eq!(result.failures.len(), 1);
    }
}
