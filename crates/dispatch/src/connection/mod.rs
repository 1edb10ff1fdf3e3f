//! Server-side handle for one connected runner.

mod state;

pub use state::{transition, ConnectionEvent, RunnerState};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use velo_wire::{CloseCode, RunnerBound, RunnerInformation, RunnerStatus, WorkOrder};

use crate::heartbeat::{HeartbeatMonitor, HeartbeatTarget};
use crate::state_machine::StateMachine;
use crate::traits::RunnerLink;

/// Closes the socket when the heartbeat monitor gives up on it.
struct LinkHeartbeat {
    runner: String,
    link: Arc<dyn RunnerLink>,
}

impl HeartbeatTarget for LinkHeartbeat {
    fn send_ping(&self) -> bool {
        self.link.send_ping()
    }

    fn on_timeout_detected(&self) {
        warn!(runner = %self.runner, "runner stopped answering pings, disconnecting");
        self.link
            .close(CloseCode::ServerDisconnect, "heartbeat timeout");
    }
}

pub struct RunnerConnection {
    name: String,
    link: Arc<dyn RunnerLink>,
    machine: StateMachine<RunnerState>,
    heartbeat: Option<HeartbeatMonitor>,
    /// Last `RunnerInformation` the runner sent.
    reported: Mutex<Option<RunnerInformation>>,
}

impl RunnerConnection {
    /// Create a connection in `Idle`.
    ///
    /// With a heartbeat timeout the monitor is spawned on the current tokio
    /// runtime; without one the connection is never pinged.
    pub fn new(
        name: impl Into<String>,
        link: Arc<dyn RunnerLink>,
        heartbeat_timeout: Option<Duration>,
    ) -> Self {
        let name = name.into();
        let heartbeat = heartbeat_timeout.map(|timeout| {
            let target = Arc::new(LinkHeartbeat {
                runner: name.clone(),
                link: Arc::clone(&link),
            });
            HeartbeatMonitor::start(timeout, target)
        });
        Self {
            name,
            link,
            machine: StateMachine::new(RunnerState::Idle),
            heartbeat,
            reported: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Arc<RunnerState> {
        self.machine.current()
    }

    /// Last-known status. `Disconnected` once stopped.
    pub fn status(&self) -> RunnerStatus {
        if self.machine.is_stopped() {
            return RunnerStatus::Disconnected;
        }
        self.machine.current().status()
    }

    pub fn current_order(&self) -> Option<WorkOrder> {
        if self.machine.is_stopped() {
            return None;
        }
        self.machine.current().order().cloned()
    }

    pub fn is_idle(&self) -> bool {
        !self.machine.is_stopped() && matches!(*self.machine.current(), RunnerState::Idle)
    }

    pub fn is_stopped(&self) -> bool {
        self.machine.is_stopped()
    }

    pub fn on_pong(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.on_pong();
        }
    }

    pub fn reported_info(&self) -> Option<RunnerInformation> {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_reported_info(&self, info: RunnerInformation) {
        *self.reported.lock().unwrap_or_else(PoisonError::into_inner) = Some(info);
    }

    /// Encode and queue a message. `false` if encoding or sending failed.
    pub fn send(&self, message: &RunnerBound) -> bool {
        match message.to_wire() {
            Ok(text) => self.link.send_text(text),
            Err(e) => {
                warn!(runner = %self.name, message = message.identifier(), error = %e, "failed to encode message");
                false
            }
        }
    }

    pub fn close(&self, code: CloseCode, reason: &str) {
        self.link.close(code, reason);
    }

    /// Hand this runner an order. Blocks until the connection is `Idle`;
    /// `false` if it stopped first.
    pub fn assign(&self, order: WorkOrder) -> bool {
        self.machine
            .switch_from_resting_state(RunnerState::PreparingWork { order })
    }

    /// Apply an inbound event. Returns whether the state changed.
    pub fn apply(&self, event: ConnectionEvent<'_>) -> bool {
        let mut changed = false;
        let running = self.machine.change_current_state(|current| match transition(current, event) {
            Some(next) => {
                changed = true;
                Arc::new(next)
            }
            None => Arc::clone(current),
        });
        running && changed
    }

    /// Disconnect: stop the heartbeat and the state machine.
    ///
    /// Returns the order that was in flight, so its task can be requeued.
    /// Only the first call returns anything.
    pub fn stop(&self) -> Option<WorkOrder> {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.shutdown();
        }
        let last = self.machine.stop()?;
        info!(runner = %self.name, "runner connection stopped");
        last.order().cloned()
    }
}

impl std::fmt::Debug for RunnerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerConnection")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests;
