use tracing::debug;

use velo_core::TaskId;
use velo_wire::{RunnerStatus, WorkOrder};

use crate::state_machine::MachineState;

/// Server-side lifecycle of one runner connection.
///
/// `Disconnected` is not a variant: it is the stopped state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    /// Connected, nothing assigned. The only resting state.
    Idle,
    /// Order sent, waiting for the runner to confirm receipt.
    PreparingWork { order: WorkOrder },
    /// Runner confirmed and is benchmarking.
    Executing { order: WorkOrder },
}

/// Inbound runner messages that can move the state.
#[derive(Debug, Clone, Copy)]
pub enum ConnectionEvent<'a> {
    WorkReceived(&'a WorkOrder),
    BenchmarkDone(TaskId),
    ReadyForWork,
}

impl RunnerState {
    pub fn order(&self) -> Option<&WorkOrder> {
        match self {
            RunnerState::Idle => None,
            RunnerState::PreparingWork { order } | RunnerState::Executing { order } => Some(order),
        }
    }

    pub fn status(&self) -> RunnerStatus {
        match self {
            RunnerState::Idle => RunnerStatus::Idle,
            RunnerState::PreparingWork { .. } => RunnerStatus::PreparingWork,
            RunnerState::Executing { .. } => RunnerStatus::Working,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::PreparingWork { .. } => "preparing_work",
            RunnerState::Executing { .. } => "executing",
        }
    }
}

impl MachineState for RunnerState {
    fn is_resting(&self) -> bool {
        matches!(self, RunnerState::Idle)
    }

    fn on_enter(&self) {
        match self.order() {
            Some(order) => debug!(state = self.label(), task_id = %order.task_id, "entering"),
            None => debug!(state = self.label(), "entering"),
        }
    }

    fn on_exit(&self) {
        debug!(state = self.label(), "leaving");
    }
}

/// Every message-driven transition. `None` means the event does not apply
/// in this state and the state stays as it is.
///
/// `Idle -> PreparingWork` is not here: it only happens through the
/// dispatcher's resting-state switch.
pub fn transition(state: &RunnerState, event: ConnectionEvent<'_>) -> Option<RunnerState> {
    match (state, event) {
        (RunnerState::PreparingWork { order }, ConnectionEvent::WorkReceived(ack))
            if ack.task_id == order.task_id =>
        {
            Some(RunnerState::Executing {
                order: order.clone(),
            })
        }
        (RunnerState::Executing { order }, ConnectionEvent::BenchmarkDone(task_id))
            if task_id == order.task_id =>
        {
            Some(RunnerState::Idle)
        }
        (
            RunnerState::PreparingWork { .. } | RunnerState::Executing { .. },
            ConnectionEvent::ReadyForWork,
        ) => Some(RunnerState::Idle),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use velo_core::{Task, TaskPriority, TaskSource};

    fn order() -> WorkOrder {
        let task = Task::new(
            TaskSource::commit(Uuid::new_v4(), "abc1234"),
            TaskPriority::Listener,
            "listener",
        );
        WorkOrder::for_task(&task)
    }

    #[test]
    fn happy_path() {
        let order = order();
        let preparing = RunnerState::PreparingWork {
            order: order.clone(),
        };

        let executing = transition(&preparing, ConnectionEvent::WorkReceived(&order)).unwrap();
        assert_eq!(
            executing,
            RunnerState::Executing {
                order: order.clone()
            }
        );
        assert_eq!(executing.status(), RunnerStatus::Working);

        let idle = transition(&executing, ConnectionEvent::BenchmarkDone(order.task_id)).unwrap();
        assert_eq!(idle, RunnerState::Idle);
        assert!(idle.is_resting());
    }

    #[test]
    fn mismatched_task_is_ignored() {
        let order = order();
        let other = self::order();
        let preparing = RunnerState::PreparingWork {
            order: order.clone(),
        };
        assert!(transition(&preparing, ConnectionEvent::WorkReceived(&other)).is_none());

        let executing = RunnerState::Executing { order };
        assert!(transition(&executing, ConnectionEvent::BenchmarkDone(other.task_id)).is_none());
    }

    #[test]
    fn idle_ignores_everything() {
        let order = order();
        for event in [
            ConnectionEvent::WorkReceived(&order),
            ConnectionEvent::BenchmarkDone(order.task_id),
            ConnectionEvent::ReadyForWork,
        ] {
            assert!(transition(&RunnerState::Idle, event).is_none());
        }
    }

    #[test]
    fn ready_for_work_drops_assignment() {
        let order = order();
        for state in [
            RunnerState::PreparingWork {
                order: order.clone(),
            },
            RunnerState::Executing {
                order: order.clone(),
            },
        ] {
            assert_eq!(state.order(), Some(&order));
            assert_eq!(
                transition(&state, ConnectionEvent::ReadyForWork),
                Some(RunnerState::Idle)
            );
        }
    }

    #[test]
    fn benchmark_done_before_ack_is_ignored() {
        let order = order();
        let preparing = RunnerState::PreparingWork {
            order: order.clone(),
        };
        assert!(transition(&preparing, ConnectionEvent::BenchmarkDone(order.task_id)).is_none());
    }
}
