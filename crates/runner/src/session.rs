//! Runner-side protocol state that outlives individual connections.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use velo_wire::{
    BenchmarkDone, ReadyForWork, RunnerBound, RunnerInformation, RunnerStatus, ServerBound,
    WorkOrder, WorkReceived,
};

use crate::error::ExecutionError;
use crate::executor::{BenchExecutor, Execution};
use crate::output::ParsedOutput;

/// A benchmark task reporting back.
#[derive(Debug)]
pub struct Finished {
    pub order: WorkOrder,
    pub outcome: Result<Execution, ExecutionError>,
}

struct Job {
    order: WorkOrder,
    /// Taken once the job has been asked to stop.
    cancel: Option<oneshot::Sender<String>>,
}

pub struct Session {
    executor: Arc<BenchExecutor>,
    machine_info: String,
    events: mpsc::UnboundedSender<Finished>,
    job: Option<Job>,
    last_done: Option<BenchmarkDone>,
    bench_hash: Option<String>,
}

impl Session {
    pub fn new(executor: BenchExecutor) -> (Self, mpsc::UnboundedReceiver<Finished>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            executor: Arc::new(executor),
            machine_info: machine_info(),
            events,
            job: None,
            last_done: None,
            bench_hash: None,
        };
        (session, rx)
    }

    pub fn status(&self) -> RunnerStatus {
        if self.job.is_some() {
            RunnerStatus::Working
        } else {
            RunnerStatus::Idle
        }
    }

    /// React to a server message; returns the replies to send.
    pub fn handle(&mut self, message: RunnerBound) -> Vec<ServerBound> {
        match message {
            RunnerBound::WorkOrder(order) => self.start(order),
            RunnerBound::UpdateBenchmarkRepoOrder(update) => {
                info!(commit = %update.commit_hash, "benchmark repository updated");
                self.bench_hash = Some(update.commit_hash);
                Vec::new()
            }
            RunnerBound::ResetOrder(reset) => {
                if self.job.is_some() {
                    self.cancel(&reset.reason);
                    // ReadyForWork follows once the benchmark is gone.
                    Vec::new()
                } else {
                    vec![ServerBound::ReadyForWork(ReadyForWork {})]
                }
            }
            RunnerBound::RequestStatus(_) => {
                vec![ServerBound::RunnerInformation(self.information())]
            }
            RunnerBound::RequestResults(_) => match &self.last_done {
                Some(done) => vec![ServerBound::BenchmarkDone(done.clone())],
                None => {
                    debug!("results requested but none cached");
                    vec![ServerBound::ReadyForWork(ReadyForWork {})]
                }
            },
        }
    }

    /// Ask the running benchmark, if any, to stop.
    pub fn cancel(&mut self, reason: &str) {
        let Some(job) = &mut self.job else {
            return;
        };
        if let Some(cancel) = job.cancel.take() {
            info!(task_id = %job.order.task_id, reason, "stopping benchmark");
            if cancel.send(reason.to_string()).is_err() {
                debug!(task_id = %job.order.task_id, "benchmark already finished");
            }
        }
    }

    /// Turn a finished benchmark into the message the server expects.
    pub fn on_finished(&mut self, finished: Finished) -> Vec<ServerBound> {
        let Finished { order, outcome } = finished;
        let cancelled = match &self.job {
            Some(job) if job.order.task_id == order.task_id => job.cancel.is_none(),
            _ => {
                debug!(task_id = %order.task_id, "ignoring result of a stale job");
                return Vec::new();
            }
        };
        self.job = None;

        let done = match outcome {
            Ok(_) if cancelled => {
                debug!(task_id = %order.task_id, "benchmark finished after cancellation, dropping result");
                return vec![ServerBound::ReadyForWork(ReadyForWork {})];
            }
            Err(ExecutionError::ProgramCancelled { reason }) => {
                info!(task_id = %order.task_id, %reason, "benchmark cancelled");
                return vec![ServerBound::ReadyForWork(ReadyForWork {})];
            }
            Ok(execution) => BenchmarkDone {
                task_id: order.task_id,
                start_time: execution.start_time,
                stop_time: execution.stop_time,
                result: execution.output.result,
                dimensions: execution.output.dimensions,
            },
            Err(e @ ExecutionError::Spawn(_)) => {
                warn!(task_id = %order.task_id, error = %e, "benchmark could not run");
                let now = Utc::now();
                let output = ParsedOutput::failed(e.to_string());
                BenchmarkDone {
                    task_id: order.task_id,
                    start_time: now,
                    stop_time: now,
                    result: output.result,
                    dimensions: output.dimensions,
                }
            }
        };

        self.last_done = Some(done.clone());
        vec![ServerBound::BenchmarkDone(done)]
    }

    fn start(&mut self, order: WorkOrder) -> Vec<ServerBound> {
        if let Some(job) = &self.job {
            warn!(
                task_id = %order.task_id,
                busy_with = %job.order.task_id,
                "work order while busy, ignoring"
            );
            return Vec::new();
        }

        let (cancel, cancelled) = oneshot::channel();
        let executor = Arc::clone(&self.executor);
        let events = self.events.clone();
        let job_order = order.clone();
        tokio::spawn(async move {
            let outcome = executor.run(&job_order, cancelled).await;
            if events
                .send(Finished {
                    order: job_order,
                    outcome,
                })
                .is_err()
            {
                debug!("runner session gone, dropping benchmark outcome");
            }
        });

        info!(task_id = %order.task_id, source = %order.source, "work order accepted");
        self.job = Some(Job {
            order: order.clone(),
            cancel: Some(cancel),
        });
        vec![ServerBound::WorkReceived(WorkReceived { work_order: order })]
    }

    fn information(&self) -> RunnerInformation {
        RunnerInformation {
            status: self.status(),
            info: self.machine_info.clone(),
            bench_hash: self.bench_hash.clone(),
            current_task: self.job.as_ref().map(|job| job.order.task_id),
        }
    }
}

fn machine_info() -> String {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    format!(
        "{} {} ({} cpus)",
        std::env::consts::OS,
        std::env::consts::ARCH,
        cpus
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;
    use velo_core::{RunResult, TaskSource};
    use velo_wire::{RequestResults, RequestStatus, ResetOrder, UpdateBenchmarkRepoOrder};

    use super::*;

    fn session(dir: &tempfile::TempDir, command: &str) -> (Session, mpsc::UnboundedReceiver<Finished>) {
        Session::new(BenchExecutor::new(command, dir.path(), Duration::from_millis(200)))
    }

    fn order() -> WorkOrder {
        WorkOrder {
            task_id: Uuid::new_v4(),
            source: TaskSource::commit(Uuid::new_v4(), "abcdef1"),
            remote_url_identifier: "repo".into(),
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Finished>) -> Finished {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("benchmark did not finish")
            .expect("session dropped")
    }

    #[tokio::test]
    async fn work_order_runs_and_result_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut rx) = session(&dir, r#"echo '{"error": "boom"}'"#);
        let order = order();

        let replies = session.handle(RunnerBound::WorkOrder(order.clone()));
        assert_eq!(
            replies,
            vec![ServerBound::WorkReceived(WorkReceived {
                work_order: order.clone()
            })]
        );
        assert_eq!(session.status(), RunnerStatus::Working);

        let replies = session.on_finished(next(&mut rx).await);
        let [ServerBound::BenchmarkDone(done)] = replies.as_slice() else {
            panic!("expected a result, got {replies:?}");
        };
        assert_eq!(done.task_id, order.task_id);
        assert!(matches!(&done.result, RunResult::Failed(e) if e.message == "boom"));
        assert_eq!(session.status(), RunnerStatus::Idle);

        let resent = session.handle(RunnerBound::RequestResults(RequestResults {}));
        assert_eq!(resent, vec![ServerBound::BenchmarkDone(done.clone())]);
    }

    #[tokio::test]
    async fn reset_cancels_and_reports_ready() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut rx) = session(&dir, "sleep 30");
        session.handle(RunnerBound::WorkOrder(order()));

        let replies = session.handle(RunnerBound::ResetOrder(ResetOrder {
            reason: "task cancelled".into(),
        }));
        assert!(replies.is_empty());

        let replies = session.on_finished(next(&mut rx).await);
        assert_eq!(replies, vec![ServerBound::ReadyForWork(ReadyForWork {})]);
        assert_eq!(session.status(), RunnerStatus::Idle);
    }

    #[tokio::test]
    async fn idle_reset_and_empty_results_report_ready() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _rx) = session(&dir, "true");
        let ready = vec![ServerBound::ReadyForWork(ReadyForWork {})];

        let replies = session.handle(RunnerBound::ResetOrder(ResetOrder {
            reason: "heartbeat".into(),
        }));
        assert_eq!(replies, ready);
        assert_eq!(session.handle(RunnerBound::RequestResults(RequestResults {})), ready);
    }

    #[tokio::test]
    async fn status_reports_bench_hash_and_task() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _rx) = session(&dir, "sleep 30");
        session.handle(RunnerBound::UpdateBenchmarkRepoOrder(UpdateBenchmarkRepoOrder {
            commit_hash: "0123456".into(),
        }));
        let order = order();
        session.handle(RunnerBound::WorkOrder(order.clone()));

        let replies = session.handle(RunnerBound::RequestStatus(RequestStatus {}));
        let [ServerBound::RunnerInformation(info)] = replies.as_slice() else {
            panic!("expected runner information, got {replies:?}");
        };
        assert_eq!(info.status, RunnerStatus::Working);
        assert_eq!(info.bench_hash.as_deref(), Some("0123456"));
        assert_eq!(info.current_task, Some(order.task_id));
        assert!(!info.info.is_empty());

        // A second order while busy is ignored.
        assert!(session.handle(RunnerBound::WorkOrder(self::order())).is_empty());
        session.cancel("test over");
    }

    #[tokio::test]
    async fn stale_results_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _rx) = session(&dir, "true");
        let replies = session.on_finished(Finished {
            order: order(),
            outcome: Err(ExecutionError::ProgramCancelled {
                reason: "old".into(),
            }),
        });
        assert!(replies.is_empty());
    }
}
