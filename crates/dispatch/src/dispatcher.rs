//! Assigns queued tasks to idle runners and routes runner messages.
//!
//! Lock discipline: the queue lock is only held for single queue operations
//! and never while calling into a connection's state machine. Dispatch passes
//! are serialized by `dispatch_lock`, which is why an idle connection seen at
//! the start of a pass can only leave `Idle` by stopping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use velo_core::{Run, Task, TaskId, TaskPriority, TaskSource};
use velo_wire::{
    BenchmarkDone, CloseCode, RequestResults, RequestStatus, ResetOrder, RunnerBound,
    RunnerInformation, RunnerStatus, ServerBound, UpdateBenchmarkRepoOrder, WorkOrder,
};

use crate::connection::{ConnectionEvent, RunnerConnection, RunnerState};
use crate::error::{RegistrationError, TaskRejection};
use crate::queue::{Cancelled, EnqueueOutcome, TaskQueue};
use crate::traits::{ResultSink, RunnerLink};

/// Snapshot of one connected runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerSummary {
    pub name: String,
    pub status: RunnerStatus,
    pub current_task: Option<TaskId>,
    /// Machine description the runner reported.
    pub info: Option<String>,
    pub bench_hash: Option<String>,
}

/// Result of cancelling a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Pending(Task),
    /// The task was running; `runner` got a reset order.
    InProcess { task: Task, runner: Option<String> },
}

pub struct Dispatcher {
    queue: Mutex<TaskQueue>,
    connections: RwLock<HashMap<String, Arc<RunnerConnection>>>,
    dispatch_lock: Mutex<()>,
    sink: Arc<dyn ResultSink>,
    heartbeat_timeout: Option<Duration>,
    bench_repo_commit: Option<String>,
}

impl Dispatcher {
    pub fn new(queue: TaskQueue, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            queue: Mutex::new(queue),
            connections: RwLock::new(HashMap::new()),
            dispatch_lock: Mutex::new(()),
            sink,
            heartbeat_timeout: None,
            bench_repo_commit: None,
        }
    }

    /// Ping every runner and drop it after `timeout` without a pong.
    /// Registration must then happen inside a tokio runtime.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    /// Benchmark repository commit every runner is told to use on connect.
    pub fn with_bench_repo_commit(mut self, commit_hash: impl Into<String>) -> Self {
        self.bench_repo_commit = Some(commit_hash.into());
        self
    }

    fn queue(&self) -> MutexGuard<'_, TaskQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connection(&self, name: &str) -> Option<Arc<RunnerConnection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    // ── Task submission ───────────────────────────────────────

    /// Enqueue a task and try to dispatch it right away.
    pub fn submit(
        &self,
        source: TaskSource,
        priority: TaskPriority,
        author: &str,
    ) -> Result<(Task, EnqueueOutcome), TaskRejection> {
        let result = self.queue().enqueue(source, priority, author);
        match &result {
            Ok((task, EnqueueOutcome::AlreadyQueued)) => {
                debug!(task_id = %task.id, "commit already queued");
            }
            Ok(_) => {
                self.dispatch();
            }
            Err(e) => info!(author, error = %e, "task rejected"),
        }
        result
    }

    pub fn cancel(&self, id: TaskId) -> Option<CancelOutcome> {
        // A dispatch pass may have popped the task but not yet assigned it.
        let _pass = self.dispatch_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let cancelled = self.queue().cancel(id)?;
        match cancelled {
            Cancelled::Pending(task) => Some(CancelOutcome::Pending(task)),
            Cancelled::InProcess(task) => {
                let holder = self
                    .connections
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .find(|c| c.current_order().is_some_and(|o| o.task_id == id))
                    .cloned();
                if let Some(conn) = &holder {
                    info!(runner = conn.name(), task_id = %id, "resetting runner for cancelled task");
                    conn.send(&RunnerBound::ResetOrder(ResetOrder {
                        reason: "task cancelled".into(),
                    }));
                }
                Some(CancelOutcome::InProcess {
                    task,
                    runner: holder.map(|c| c.name().to_string()),
                })
            }
        }
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        self.queue().pending()
    }

    pub fn in_process_tasks(&self) -> Vec<Task> {
        self.queue().in_process()
    }

    // ── Connections ───────────────────────────────────────────

    /// Register a freshly connected runner, greet it and give it work.
    pub fn register(
        &self,
        name: &str,
        link: Arc<dyn RunnerLink>,
    ) -> Result<Arc<RunnerConnection>, RegistrationError> {
        let conn = {
            let mut connections = self
                .connections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if connections.contains_key(name) {
                warn!(runner = name, "rejecting runner, name already connected");
                return Err(RegistrationError::NameTaken(name.to_string()));
            }
            let conn = Arc::new(RunnerConnection::new(name, link, self.heartbeat_timeout));
            connections.insert(name.to_string(), Arc::clone(&conn));
            conn
        };
        info!(runner = name, "runner connected");

        conn.send(&RunnerBound::RequestStatus(RequestStatus {}));
        if let Some(commit_hash) = &self.bench_repo_commit {
            conn.send(&RunnerBound::UpdateBenchmarkRepoOrder(
                UpdateBenchmarkRepoOrder {
                    commit_hash: commit_hash.clone(),
                },
            ));
        }

        self.dispatch();
        Ok(conn)
    }

    /// Forget a runner. Work it held goes back to the front of its band.
    pub fn disconnect(&self, name: &str, code: Option<CloseCode>) {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        let Some(conn) = removed else {
            return;
        };
        match code {
            Some(code) => info!(runner = name, close_code = %code, "runner disconnected"),
            None => info!(runner = name, "runner disconnected"),
        }

        if let Some(order) = conn.stop() {
            warn!(runner = name, task_id = %order.task_id, "runner abandoned task");
            self.queue().requeue_front(order.task_id);
            self.dispatch();
        }
    }

    pub fn on_pong(&self, name: &str) {
        if let Some(conn) = self.connection(name) {
            conn.on_pong();
        }
    }

    pub fn runners(&self) -> Vec<RunnerSummary> {
        let mut runners: Vec<RunnerSummary> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|conn| {
                let reported = conn.reported_info();
                RunnerSummary {
                    name: conn.name().to_string(),
                    status: conn.status(),
                    current_task: conn.current_order().map(|o| o.task_id),
                    info: reported.as_ref().map(|r| r.info.clone()),
                    bench_hash: reported.and_then(|r| r.bench_hash),
                }
            })
            .collect();
        runners.sort_by(|a, b| a.name.cmp(&b.name));
        runners
    }

    /// Close and stop every connection.
    pub fn shutdown(&self) {
        let connections: Vec<_> = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, conn)| conn)
            .collect();
        for conn in connections {
            conn.close(CloseCode::ServerDisconnect, "server shutting down");
            conn.stop();
        }
    }

    // ── Inbound messages ──────────────────────────────────────

    /// Decode and handle one text frame from `name`.
    ///
    /// Undecodable and unknown messages are logged and dropped.
    pub fn handle_message(&self, name: &str, text: &str) {
        let Some(conn) = self.connection(name) else {
            debug!(runner = name, "message from unregistered runner");
            return;
        };
        let message = match ServerBound::from_wire(text) {
            Ok(message) => message,
            Err(e) if e.is_unknown_type() => {
                info!(runner = name, error = %e, "ignoring unknown message type");
                return;
            }
            Err(e) => {
                warn!(runner = name, error = %e, "dropping undecodable message");
                return;
            }
        };
        debug!(runner = name, message = message.identifier(), "received");

        match message {
            ServerBound::WorkReceived(ack) => {
                if conn.apply(ConnectionEvent::WorkReceived(&ack.work_order)) {
                    info!(runner = name, task_id = %ack.work_order.task_id, "runner started benchmark");
                } else {
                    debug!(runner = name, "ignoring stale work confirmation");
                }
            }
            ServerBound::BenchmarkDone(done) => self.on_benchmark_done(&conn, done),
            ServerBound::ReadyForWork(_) => self.on_ready_for_work(&conn),
            ServerBound::RunnerInformation(info) => self.on_runner_information(&conn, info),
        }
    }

    fn on_benchmark_done(&self, conn: &RunnerConnection, done: BenchmarkDone) {
        let executing = matches!(
            &*conn.state(),
            RunnerState::Executing { order } if order.task_id == done.task_id
        );
        if !executing {
            debug!(runner = conn.name(), task_id = %done.task_id, "ignoring result for task not being executed");
            return;
        }

        // The run reaches the sink before the connection returns to Idle.
        match self.queue().complete(done.task_id) {
            Some(task) => {
                let run = Run {
                    id: Uuid::new_v4(),
                    author: task.author,
                    runner_name: conn.name().to_string(),
                    runner_info: conn.reported_info().map(|i| i.info).unwrap_or_default(),
                    start_time: done.start_time,
                    stop_time: done.stop_time,
                    source: task.source,
                    result: done.result,
                };
                info!(
                    runner = conn.name(),
                    task_id = %done.task_id,
                    run_id = %run.id,
                    failed = run.is_failed(),
                    "benchmark finished"
                );
                self.sink.submit(run, done.dimensions);
            }
            None => info!(task_id = %done.task_id, "task was cancelled, discarding result"),
        }

        conn.apply(ConnectionEvent::BenchmarkDone(done.task_id));
        self.dispatch();
    }

    fn on_ready_for_work(&self, conn: &RunnerConnection) {
        let order = conn.current_order();
        if conn.apply(ConnectionEvent::ReadyForWork) {
            if let Some(order) = order {
                warn!(runner = conn.name(), task_id = %order.task_id, "runner dropped its work");
                self.queue().requeue_front(order.task_id);
            }
        }
        self.dispatch();
    }

    fn on_runner_information(&self, conn: &RunnerConnection, info: RunnerInformation) {
        debug!(runner = conn.name(), status = %info.status, "runner reported status");
        let lost_result = info.status == RunnerStatus::Idle
            && matches!(*conn.state(), RunnerState::Executing { .. });
        conn.set_reported_info(info);
        if lost_result {
            info!(runner = conn.name(), "runner idle while executing, requesting results");
            conn.send(&RunnerBound::RequestResults(RequestResults {}));
        }
    }

    // ── Assignment ────────────────────────────────────────────

    /// Hand pending tasks to idle runners until either runs out.
    /// Returns how many orders were sent.
    pub fn dispatch(&self) -> usize {
        let _pass = self.dispatch_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut idle: Vec<Arc<RunnerConnection>> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.is_idle())
            .cloned()
            .collect();
        idle.sort_by(|a, b| a.name().cmp(b.name()));

        let mut sent = 0;
        for conn in idle {
            let Some(task) = self.queue().pop_next() else {
                break;
            };
            let order = WorkOrder::for_task(&task);

            if !conn.assign(order.clone()) {
                debug!(runner = conn.name(), task_id = %task.id, "runner stopped before assignment");
                self.queue().requeue_front(task.id);
                continue;
            }

            if conn.send(&RunnerBound::WorkOrder(order)) {
                info!(runner = conn.name(), task_id = %task.id, source = %task.source, "task dispatched");
                sent += 1;
            } else {
                // The disconnect path will requeue it.
                warn!(runner = conn.name(), task_id = %task.id, "failed to send work order");
            }
        }
        sent
    }
}
