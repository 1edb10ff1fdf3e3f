//! Integration tests for the runner protocol as seen from both ends.
//!
//! Messages are encoded with one side's enum and decoded with the other
//! side's expectations, mirroring what travels over the websocket.

use chrono::Utc;
use uuid::Uuid;

use velo_core::{
    Dimension, Interpretation, Measurement, MeasurementValues, Measurements, RunResult, Task,
    TaskPriority, TaskSource,
};
use velo_wire::{
    peek_type, BenchmarkDone, CloseCode, ReadyForWork, ReportedDimension, RunnerBound,
    ServerBound, WorkOrder, WorkReceived,
};

#[test]
fn work_order_survives_the_wire() {
    let repo = Uuid::new_v4();
    let task = Task::new(TaskSource::commit(repo, "abc"), TaskPriority::Manual, "alice");
    let order = WorkOrder::for_task(&task);

    let wire = RunnerBound::WorkOrder(order.clone()).to_wire().unwrap();
    assert_eq!(peek_type(&wire).unwrap(), "WorkOrder");

    match RunnerBound::from_wire(&wire).unwrap() {
        RunnerBound::WorkOrder(decoded) => {
            assert_eq!(decoded.repo_id(), Some(repo));
            assert_eq!(decoded.commit_hash(), Some("abc"));
            assert_eq!(decoded, order);
        }
        other => panic!("expected WorkOrder, got {other:?}"),
    }
}

#[test]
fn runner_echoes_order_in_work_received() {
    let task = Task::new(
        TaskSource::Tar {
            description: "local build".into(),
            repo_id: None,
        },
        TaskPriority::UserCreated,
        "bob",
    );
    let order = WorkOrder::for_task(&task);

    let ack = ServerBound::WorkReceived(WorkReceived {
        work_order: order.clone(),
    });
    let wire = ack.to_wire().unwrap();

    match ServerBound::from_wire(&wire).unwrap() {
        ServerBound::WorkReceived(received) => {
            assert_eq!(received.work_order.task_id, task.id);
            assert!(received.work_order.remote_url_identifier.starts_with("tar-"));
        }
        other => panic!("expected WorkReceived, got {other:?}"),
    }
}

#[test]
fn benchmark_done_keeps_per_dimension_errors() {
    let measurements = Measurements::from_entries([
        (
            Dimension::new("const_fold", "instructions"),
            Measurement::error("benchmark crashed"),
        ),
        (
            Dimension::new("bin/lean", "binary size"),
            Measurement::Values(MeasurementValues::new(vec![1.0, 2.0, 3.0]).unwrap()),
        ),
    ])
    .unwrap();
    let done = BenchmarkDone {
        task_id: Uuid::new_v4(),
        start_time: Utc::now(),
        stop_time: Utc::now(),
        result: RunResult::Measured(measurements),
        dimensions: vec![ReportedDimension {
            dimension: Dimension::new("bin/lean", "binary size"),
            unit: "B".into(),
            interpretation: Interpretation::LessIsBetter,
        }],
    };

    let wire = ServerBound::BenchmarkDone(done.clone()).to_wire().unwrap();
    let ServerBound::BenchmarkDone(decoded) = ServerBound::from_wire(&wire).unwrap() else {
        panic!("expected BenchmarkDone");
    };

    let RunResult::Measured(m) = &decoded.result else {
        panic!("expected measurements");
    };
    assert!(m
        .get(&Dimension::new("const_fold", "instructions"))
        .unwrap()
        .values()
        .is_none());
    assert_eq!(decoded, done);
}

#[test]
fn sides_reject_each_others_messages() {
    let to_server = ServerBound::ReadyForWork(ReadyForWork {}).to_wire().unwrap();
    assert!(RunnerBound::from_wire(&to_server).unwrap_err().is_unknown_type());
}

#[test]
fn close_codes_are_stable() {
    assert_eq!(CloseCode::ClientDisconnect.code(), 4000);
    assert_eq!(CloseCode::ServerDisconnect.code(), 4002);
    assert_eq!(CloseCode::NameTaken.code(), 4003);
    assert_eq!(CloseCode::from_code(4003), Some(CloseCode::NameTaken));
}
