//! Messages runners send to the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use velo_core::{Dimension, Interpretation, RunResult, TaskId};

use super::entities;
use super::runner_bound::WorkOrder;
use crate::envelope::{self, Entity};
use crate::error::WireError;

/// Runner confirms it received the order and its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkReceived {
    pub work_order: WorkOrder,
}

/// Unit and interpretation a benchmark script reported for a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedDimension {
    pub dimension: Dimension,
    pub unit: String,
    pub interpretation: Interpretation,
}

/// A benchmark finished, successfully or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDone {
    pub task_id: TaskId,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub result: RunResult,
    #[serde(default)]
    pub dimensions: Vec<ReportedDimension>,
}

/// Runner dropped any work it had and can take a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReadyForWork {}

/// Status as seen by the runner itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    Idle,
    Initializing,
    PreparingWork,
    Working,
    Disconnected,
}

impl std::fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunnerStatus::Idle => "idle",
            RunnerStatus::Initializing => "initializing",
            RunnerStatus::PreparingWork => "preparing_work",
            RunnerStatus::Working => "working",
            RunnerStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Runner self-description, sent on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerInformation {
    pub status: RunnerStatus,
    /// Free-text machine description (OS, CPU, ...).
    #[serde(default)]
    pub info: String,
    /// Benchmark repository commit the runner currently has.
    #[serde(default)]
    pub bench_hash: Option<String>,
    /// Task the runner is working on, if any.
    #[serde(default)]
    pub current_task: Option<TaskId>,
}

entities!(WorkReceived, BenchmarkDone, ReadyForWork, RunnerInformation);

/// Any message the server can receive from a runner.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerBound {
    WorkReceived(WorkReceived),
    BenchmarkDone(BenchmarkDone),
    ReadyForWork(ReadyForWork),
    RunnerInformation(RunnerInformation),
}

impl ServerBound {
    pub fn identifier(&self) -> &'static str {
        match self {
            ServerBound::WorkReceived(_) => WorkReceived::IDENTIFIER,
            ServerBound::BenchmarkDone(_) => BenchmarkDone::IDENTIFIER,
            ServerBound::ReadyForWork(_) => ReadyForWork::IDENTIFIER,
            ServerBound::RunnerInformation(_) => RunnerInformation::IDENTIFIER,
        }
    }

    pub fn to_wire(&self) -> Result<String, WireError> {
        match self {
            ServerBound::WorkReceived(m) => envelope::serialize(m),
            ServerBound::BenchmarkDone(m) => envelope::serialize(m),
            ServerBound::ReadyForWork(m) => envelope::serialize(m),
            ServerBound::RunnerInformation(m) => envelope::serialize(m),
        }
    }

    pub fn from_wire(wire: &str) -> Result<Self, WireError> {
        let identifier = envelope::peek_type(wire)?;
        match identifier.as_str() {
            WorkReceived::IDENTIFIER => envelope::deserialize(wire).map(ServerBound::WorkReceived),
            BenchmarkDone::IDENTIFIER => {
                envelope::deserialize(wire).map(ServerBound::BenchmarkDone)
            }
            ReadyForWork::IDENTIFIER => envelope::deserialize(wire).map(ServerBound::ReadyForWork),
            RunnerInformation::IDENTIFIER => {
                envelope::deserialize(wire).map(ServerBound::RunnerInformation)
            }
            _ => Err(WireError::UnknownType(identifier)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velo_core::{Measurement, MeasurementValues, Measurements, RunError};

    #[test]
    fn benchmark_done_roundtrip() {
        let measurements = Measurements::from_entries([(
            Dimension::new("bin/lean", "binary size"),
            Measurement::Values(MeasurementValues::new(vec![92_456.0]).unwrap()),
        )])
        .unwrap();
        let done = ServerBound::BenchmarkDone(BenchmarkDone {
            task_id: uuid::Uuid::new_v4(),
            start_time: Utc::now(),
            stop_time: Utc::now(),
            result: RunResult::Measured(measurements),
            dimensions: vec![ReportedDimension {
                dimension: Dimension::new("bin/lean", "binary size"),
                unit: "B".into(),
                interpretation: Interpretation::LessIsBetter,
            }],
        });

        let wire = done.to_wire().unwrap();
        assert_eq!(ServerBound::from_wire(&wire).unwrap(), done);
    }

    #[test]
    fn failed_run_roundtrip() {
        let done = ServerBound::BenchmarkDone(BenchmarkDone {
            task_id: uuid::Uuid::new_v4(),
            start_time: Utc::now(),
            stop_time: Utc::now(),
            result: RunResult::Failed(RunError::new("exit code 1")),
            dimensions: vec![],
        });
        let wire = done.to_wire().unwrap();
        assert_eq!(ServerBound::from_wire(&wire).unwrap(), done);
    }

    #[test]
    fn runner_information_optional_fields_default() {
        let payload = r#"{"status":"idle"}"#;
        let wire = serde_json::json!({
            "payload": payload,
            "identifier": "RunnerInformation",
        })
        .to_string();

        match ServerBound::from_wire(&wire).unwrap() {
            ServerBound::RunnerInformation(info) => {
                assert_eq!(info.status, RunnerStatus::Idle);
                assert!(info.bench_hash.is_none());
                assert!(info.current_task.is_none());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn runner_bound_type_is_unknown_here() {
        let wire = r#"{"payload": "{}", "identifier": "RequestStatus"}"#;
        assert!(ServerBound::from_wire(wire).unwrap_err().is_unknown_type());
    }
}
