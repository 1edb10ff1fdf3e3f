//! Runs the benchmark command for one work order.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use velo_wire::WorkOrder;

use crate::error::ExecutionError;
use crate::output::{self, ParsedOutput};

/// Lines of stderr kept in the error message of a failed run.
const STDERR_TAIL_LINES: usize = 20;

/// Outcome of a benchmark that ran to completion, successful or not.
#[derive(Debug, Clone)]
pub struct Execution {
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub output: ParsedOutput,
}

#[derive(Debug, Clone)]
pub struct BenchExecutor {
    command: String,
    work_dir: PathBuf,
    force_kill_delay: Duration,
}

impl BenchExecutor {
    pub fn new(command: impl Into<String>, work_dir: impl Into<PathBuf>, force_kill_delay: Duration) -> Self {
        Self {
            command: command.into(),
            work_dir: work_dir.into(),
            force_kill_delay,
        }
    }

    /// Run the command until it exits or `cancel` fires.
    ///
    /// Dropping the sender counts as a cancellation.
    pub async fn run(
        &self,
        order: &WorkOrder,
        cancel: oneshot::Receiver<String>,
    ) -> Result<Execution, ExecutionError> {
        let start_time = Utc::now();
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.work_dir)
            .env("VELO_TASK_ID", order.task_id.to_string())
            .env(
                "VELO_REPO_ID",
                order.repo_id().map(|id| id.to_string()).unwrap_or_default(),
            )
            .env("VELO_COMMIT_HASH", order.commit_hash().unwrap_or_default())
            .env("VELO_WORK_DIR", &self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        info!(task_id = %order.task_id, pid = ?child.id(), "benchmark started");

        let stdout = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
        let stderr = child.stderr.take().map(|err| tokio::spawn(read_all(err)));

        let status = tokio::select! {
            status = child.wait() => status?,
            reason = cancel => {
                let reason = reason.unwrap_or_else(|_| "runner stopped".to_string());
                info!(task_id = %order.task_id, %reason, "cancelling benchmark");
                self.terminate(&mut child).await;
                for reader in [stdout, stderr].into_iter().flatten() {
                    reader.abort();
                }
                return Err(ExecutionError::ProgramCancelled { reason });
            }
        };
        let stop_time = Utc::now();

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let output = if status.success() {
            output::parse(&stdout)
        } else {
            ParsedOutput::failed(exit_message(status, &stderr))
        };
        info!(
            task_id = %order.task_id,
            %status,
            duration_ms = (stop_time - start_time).num_milliseconds(),
            "benchmark finished"
        );

        Ok(Execution {
            start_time,
            stop_time,
            output,
        })
    }

    /// SIGTERM first, SIGKILL once the grace period is over.
    async fn terminate(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            match Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await
            {
                Ok(status) if status.success() => {}
                Ok(status) => debug!(pid, %status, "kill -TERM did not succeed"),
                Err(e) => debug!(pid, error = %e, "could not run kill"),
            }
            if let Ok(Ok(status)) = tokio::time::timeout(self.force_kill_delay, child.wait()).await {
                debug!(pid, %status, "benchmark exited after SIGTERM");
                return;
            }
        }
        warn!(
            delay_secs = self.force_kill_delay.as_secs_f64(),
            "benchmark ignored SIGTERM, killing"
        );
        if let Err(e) = child.kill().await {
            warn!(error = %e, "failed to kill benchmark");
        }
    }
}

async fn read_all(mut stream: impl AsyncRead + Unpin) -> String {
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        debug!(error = %e, "benchmark output stream failed");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(reader: Option<JoinHandle<String>>) -> String {
    match reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn exit_message(status: ExitStatus, stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    if tail.trim().is_empty() {
        format!("benchmark failed with {status}")
    } else {
        format!("benchmark failed with {status}:\n{tail}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use uuid::Uuid;
    use velo_core::{Dimension, RunResult, TaskSource};

    use super::*;

    fn order() -> WorkOrder {
        WorkOrder {
            task_id: Uuid::new_v4(),
            source: TaskSource::commit(Uuid::new_v4(), "abcdef1"),
            remote_url_identifier: "repo".into(),
        }
    }

    fn executor(dir: &tempfile::TempDir, command: &str) -> BenchExecutor {
        BenchExecutor::new(command, dir.path(), Duration::from_millis(200))
    }

    fn failure_message(execution: &Execution) -> &str {
        match &execution.output.result {
            RunResult::Failed(e) => &e.message,
            RunResult::Measured(_) => panic!("expected a failed run"),
        }
    }

    #[tokio::test]
    async fn script_output_becomes_measurements() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bench.sh"),
            r#"echo "{\"$VELO_COMMIT_HASH\": {\"time\": {\"unit\": \"s\", \"interpretation\": \"LESS_IS_BETTER\", \"values\": [1, 2, 3]}}}""#,
        )
        .unwrap();

        let (_cancel, rx) = oneshot::channel();
        let execution = executor(&dir, "sh bench.sh").run(&order(), rx).await.unwrap();

        let RunResult::Measured(measurements) = &execution.output.result else {
            panic!("expected measurements, got {:?}", execution.output.result);
        };
        let time = measurements.get(&Dimension::new("abcdef1", "time")).unwrap();
        assert_eq!(time.values().unwrap().len(), 3);
        assert_eq!(execution.output.dimensions[0].unit, "s");
        assert!(execution.stop_time >= execution.start_time);
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_stderr_tail() {
        let dir = tempfile::tempdir().unwrap();
        let (_cancel, rx) = oneshot::channel();
        let execution = executor(&dir, "echo 'linker exploded' >&2; exit 3")
            .run(&order(), rx)
            .await
            .unwrap();

        let message = failure_message(&execution);
        assert!(message.contains("exit status: 3"), "{message}");
        assert!(message.ends_with("linker exploded"), "{message}");
    }

    #[tokio::test]
    async fn task_environment_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let order = order();
        let (_cancel, rx) = oneshot::channel();
        let execution = executor(&dir, r#"echo "{\"error\": \"$VELO_TASK_ID\"}""#)
            .run(&order, rx)
            .await
            .unwrap();
        assert_eq!(failure_message(&execution), order.task_id.to_string());
    }

    #[tokio::test]
    async fn cancellation_stops_the_benchmark() {
        let dir = tempfile::tempdir().unwrap();
        let (cancel, rx) = oneshot::channel();
        let executor = executor(&dir, "sleep 30");

        let started = Instant::now();
        let run = tokio::spawn(async move { executor.run(&order(), rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.send("reset by server".to_string()).unwrap();

        match run.await.unwrap() {
            Err(ExecutionError::ProgramCancelled { reason }) => assert_eq!(reason, "reset by server"),
            other => panic!("expected a cancellation, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn stubborn_benchmark_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let (cancel, rx) = oneshot::channel();
        let executor = executor(&dir, "trap '' TERM; sleep 30");

        let run = tokio::spawn(async move { executor.run(&order(), rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(cancel);

        assert!(matches!(
            run.await.unwrap(),
            Err(ExecutionError::ProgramCancelled { .. })
        ));
    }

    #[tokio::test]
    async fn missing_work_dir_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = BenchExecutor::new("true", dir.path().join("missing"), Duration::from_secs(1));
        let (_cancel, rx) = oneshot::channel();
        assert!(matches!(
            executor.run(&order(), rx).await,
            Err(ExecutionError::Spawn(_))
        ));
    }
}
