//! Runner dispatch: connection lifecycle, liveness, and task assignment.
//!
//! - [`StateMachine`]: generic guarded state container with a resting-state gate
//! - [`HeartbeatMonitor`]: ping/pong liveness per connection
//! - [`RunnerConnection`]: one runner's lifecycle on top of both
//! - [`TaskQueue`] and [`Dispatcher`]: pending work and its assignment to idle runners

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod history;
pub mod queue;
pub mod state_machine;
pub mod store;
pub mod traits;

#[cfg(test)]
mod testing;

pub use connection::{RunnerConnection, RunnerState};
pub use dispatcher::{CancelOutcome, Dispatcher, RunnerSummary};
pub use error::{RegistrationError, StoreError, TaskRejection};
pub use heartbeat::{HeartbeatMonitor, HeartbeatTarget};
pub use history::{MemoryRunHistory, RunHistory};
pub use queue::{Cancelled, EnqueueOutcome, TaskQueue};
pub use state_machine::{MachineState, StateMachine};
pub use store::{JsonFileTaskStore, MemoryTaskStore, TaskStore};
pub use traits::{ResultSink, RunnerLink};
