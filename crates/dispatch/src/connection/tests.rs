use std::sync::Arc;
use std::thread;
use std::time::Duration;

use uuid::Uuid;
use velo_core::{Task, TaskPriority, TaskSource};
use velo_wire::{CloseCode, RequestStatus, RunnerBound, RunnerStatus, WorkOrder};

use super::{ConnectionEvent, RunnerConnection, RunnerState};
use crate::testing::RecordingLink;

fn order() -> WorkOrder {
    let task = Task::new(
        TaskSource::commit(Uuid::new_v4(), "abc1234"),
        TaskPriority::UserCreated,
        "alice",
    );
    WorkOrder::for_task(&task)
}

fn connection() -> (Arc<RecordingLink>, RunnerConnection) {
    let link = Arc::new(RecordingLink::default());
    let conn = RunnerConnection::new("runner-1", link.clone(), None);
    (link, conn)
}

#[test]
fn starts_idle() {
    let (_, conn) = connection();
    assert_eq!(conn.name(), "runner-1");
    assert!(conn.is_idle());
    assert_eq!(conn.status(), RunnerStatus::Idle);
    assert!(conn.current_order().is_none());
}

#[test]
fn full_lifecycle() {
    let (_, conn) = connection();
    let order = order();

    assert!(conn.assign(order.clone()));
    assert_eq!(conn.status(), RunnerStatus::PreparingWork);
    assert_eq!(conn.current_order(), Some(order.clone()));

    assert!(conn.apply(ConnectionEvent::WorkReceived(&order)));
    assert_eq!(conn.status(), RunnerStatus::Working);

    assert!(conn.apply(ConnectionEvent::BenchmarkDone(order.task_id)));
    assert!(conn.is_idle());
    assert!(conn.current_order().is_none());
}

#[test]
fn inapplicable_event_is_a_noop() {
    let (_, conn) = connection();
    assert!(!conn.apply(ConnectionEvent::ReadyForWork));
    assert!(conn.is_idle());
}

#[test]
fn stop_returns_abandoned_order_once() {
    let (_, conn) = connection();
    let order = order();
    assert!(conn.assign(order.clone()));
    assert!(conn.apply(ConnectionEvent::WorkReceived(&order)));

    assert_eq!(conn.stop(), Some(order));
    assert_eq!(conn.stop(), None);
    assert_eq!(conn.status(), RunnerStatus::Disconnected);
    assert!(conn.current_order().is_none());
    assert!(!conn.is_idle());
}

#[test]
fn stopped_connection_refuses_work() {
    let (_, conn) = connection();
    assert_eq!(conn.stop(), None);
    assert!(!conn.assign(order()));
    assert!(!conn.apply(ConnectionEvent::ReadyForWork));
}

#[test]
fn assign_waits_until_idle() {
    let (_, conn) = connection();
    let conn = Arc::new(conn);
    let first = order();
    assert!(conn.assign(first.clone()));

    let second = order();
    let waiter = {
        let conn = Arc::clone(&conn);
        let second = second.clone();
        thread::spawn(move || conn.assign(second))
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(conn.current_order(), Some(first.clone()));

    assert!(conn.apply(ConnectionEvent::ReadyForWork));
    assert!(waiter.join().unwrap());
    assert_eq!(
        *conn.state(),
        RunnerState::PreparingWork { order: second }
    );
}

#[test]
fn send_goes_through_link() {
    let (link, conn) = connection();
    assert!(conn.send(&RunnerBound::RequestStatus(RequestStatus {})));
    assert_eq!(
        link.messages(),
        vec![RunnerBound::RequestStatus(RequestStatus {})]
    );

    conn.close(CloseCode::ServerDisconnect, "bye");
    assert_eq!(link.closed_with(), Some(CloseCode::ServerDisconnect));
    assert!(!conn.send(&RunnerBound::RequestStatus(RequestStatus {})));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_timeout_closes_link() {
    let link = Arc::new(RecordingLink::default());
    let conn = RunnerConnection::new("runner-2", link.clone(), Some(Duration::from_secs(10)));

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(link.closed_with(), Some(CloseCode::ServerDisconnect));
    conn.stop();
}

#[tokio::test(start_paused = true)]
async fn pongs_keep_connection_alive() {
    let link = Arc::new(RecordingLink::default());
    let conn = RunnerConnection::new("runner-3", link.clone(), Some(Duration::from_secs(10)));

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(3)).await;
        conn.on_pong();
    }
    assert!(link.closed_with().is_none());
    assert!(link.pings.load(std::sync::atomic::Ordering::SeqCst) > 0);
    conn.stop();
}
