//! Messages the server sends to runners.

use serde::{Deserialize, Serialize};

use velo_core::{RepoId, Task, TaskId, TaskSource};

use super::entities;
use crate::envelope::{self, Entity};
use crate::error::WireError;

/// Instruction to benchmark one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    /// Task this order was created from.
    pub task_id: TaskId,
    pub source: TaskSource,
    /// Picks a stable local clone directory on the runner.
    pub remote_url_identifier: String,
}

impl WorkOrder {
    pub fn for_task(task: &Task) -> Self {
        let remote_url_identifier = match &task.source {
            TaskSource::Commit { repo_id, .. } => repo_id.simple().to_string(),
            TaskSource::Tar { .. } => format!("tar-{}", task.id.simple()),
        };
        Self {
            task_id: task.id,
            source: task.source.clone(),
            remote_url_identifier,
        }
    }

    pub fn repo_id(&self) -> Option<RepoId> {
        self.source.repo_id()
    }

    pub fn commit_hash(&self) -> Option<&str> {
        match &self.source {
            TaskSource::Commit { commit_hash, .. } => Some(commit_hash),
            TaskSource::Tar { .. } => None,
        }
    }
}

/// Switch the benchmark repository to a new commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBenchmarkRepoOrder {
    pub commit_hash: String,
}

/// Abort whatever the runner is doing and return to idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOrder {
    pub reason: String,
}

/// Ask the runner to report a [`RunnerInformation`](super::RunnerInformation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestStatus {}

/// Ask the runner to re-send its last [`BenchmarkDone`](super::BenchmarkDone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestResults {}

entities!(
    WorkOrder,
    UpdateBenchmarkRepoOrder,
    ResetOrder,
    RequestStatus,
    RequestResults,
);

/// Any message a runner can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerBound {
    WorkOrder(WorkOrder),
    UpdateBenchmarkRepoOrder(UpdateBenchmarkRepoOrder),
    ResetOrder(ResetOrder),
    RequestStatus(RequestStatus),
    RequestResults(RequestResults),
}

impl RunnerBound {
    pub fn identifier(&self) -> &'static str {
        match self {
            RunnerBound::WorkOrder(_) => WorkOrder::IDENTIFIER,
            RunnerBound::UpdateBenchmarkRepoOrder(_) => UpdateBenchmarkRepoOrder::IDENTIFIER,
            RunnerBound::ResetOrder(_) => ResetOrder::IDENTIFIER,
            RunnerBound::RequestStatus(_) => RequestStatus::IDENTIFIER,
            RunnerBound::RequestResults(_) => RequestResults::IDENTIFIER,
        }
    }

    pub fn to_wire(&self) -> Result<String, WireError> {
        match self {
            RunnerBound::WorkOrder(m) => envelope::serialize(m),
            RunnerBound::UpdateBenchmarkRepoOrder(m) => envelope::serialize(m),
            RunnerBound::ResetOrder(m) => envelope::serialize(m),
            RunnerBound::RequestStatus(m) => envelope::serialize(m),
            RunnerBound::RequestResults(m) => envelope::serialize(m),
        }
    }

    pub fn from_wire(wire: &str) -> Result<Self, WireError> {
        let identifier = envelope::peek_type(wire)?;
        match identifier.as_str() {
            WorkOrder::IDENTIFIER => envelope::deserialize(wire).map(RunnerBound::WorkOrder),
            UpdateBenchmarkRepoOrder::IDENTIFIER => {
                envelope::deserialize(wire).map(RunnerBound::UpdateBenchmarkRepoOrder)
            }
            ResetOrder::IDENTIFIER => envelope::deserialize(wire).map(RunnerBound::ResetOrder),
            RequestStatus::IDENTIFIER => {
                envelope::deserialize(wire).map(RunnerBound::RequestStatus)
            }
            RequestResults::IDENTIFIER => {
                envelope::deserialize(wire).map(RunnerBound::RequestResults)
            }
            _ => Err(WireError::UnknownType(identifier)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use velo_core::TaskPriority;

    #[test]
    fn work_order_roundtrip() {
        let repo = Uuid::new_v4();
        let task = Task::new(
            TaskSource::commit(repo, "abc"),
            TaskPriority::Manual,
            "alice",
        );
        let order = WorkOrder::for_task(&task);

        let wire = envelope::serialize(&order).unwrap();
        let back: WorkOrder = envelope::deserialize(&wire).unwrap();

        assert_eq!(back, order);
        assert_eq!(back.repo_id(), Some(repo));
        assert_eq!(back.commit_hash(), Some("abc"));
    }

    #[test]
    fn clone_dir_is_stable_per_repo() {
        let repo = Uuid::new_v4();
        let a = Task::new(TaskSource::commit(repo, "aaaaaaa"), TaskPriority::Listener, "x");
        let b = Task::new(TaskSource::commit(repo, "bbbbbbb"), TaskPriority::Listener, "x");
        assert_eq!(
            WorkOrder::for_task(&a).remote_url_identifier,
            WorkOrder::for_task(&b).remote_url_identifier
        );
    }

    #[test]
    fn enum_dispatch_by_identifier() {
        let msg = RunnerBound::ResetOrder(ResetOrder {
            reason: "cancelled".into(),
        });
        let wire = msg.to_wire().unwrap();
        assert_eq!(envelope::peek_type(&wire).unwrap(), "ResetOrder");
        assert_eq!(RunnerBound::from_wire(&wire).unwrap(), msg);
    }

    #[test]
    fn empty_requests_roundtrip() {
        for msg in [
            RunnerBound::RequestStatus(RequestStatus {}),
            RunnerBound::RequestResults(RequestResults {}),
        ] {
            let wire = msg.to_wire().unwrap();
            assert_eq!(RunnerBound::from_wire(&wire).unwrap(), msg);
        }
    }

    #[test]
    fn unknown_identifier() {
        let wire = r#"{"payload": "{}", "identifier": "SelfDestruct"}"#;
        let err = RunnerBound::from_wire(wire).unwrap_err();
        assert!(err.is_unknown_type());
    }
}
