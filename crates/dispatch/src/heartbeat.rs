//! Ping/pong liveness monitor for one runner connection.
//!
//! Every `timeout / 2` the monitor sends a ping. If the ping went out and no
//! pong arrived for longer than `timeout`, [`HeartbeatTarget::on_timeout_detected`]
//! fires. It fires again on every later round until someone shuts the monitor
//! down, so the target is expected to disconnect on the first call.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The connection side the monitor talks to.
pub trait HeartbeatTarget: Send + Sync + 'static {
    /// Send one ping. `false` means the send failed and this round is skipped.
    fn send_ping(&self) -> bool;

    fn on_timeout_detected(&self);
}

pub struct HeartbeatMonitor {
    last_pong: Arc<Mutex<Instant>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    /// Spawn the monitor on the current tokio runtime.
    pub fn start(timeout: Duration, target: Arc<dyn HeartbeatTarget>) -> Self {
        let last_pong = Arc::new(Mutex::new(Instant::now()));
        let interval = timeout / 2;

        let handle = {
            let last_pong = Arc::clone(&last_pong);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;

                    if !target.send_ping() {
                        debug!("ping could not be sent, skipping timeout check");
                        continue;
                    }

                    let elapsed = last_pong
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .elapsed();
                    if elapsed > timeout {
                        warn!(
                            elapsed_secs = elapsed.as_secs(),
                            timeout_secs = timeout.as_secs(),
                            "heartbeat timeout"
                        );
                        target.on_timeout_detected();
                    }
                }
            })
        };

        Self {
            last_pong,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Record a pong. Safe to call from any thread.
    pub fn on_pong(&self) {
        *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn since_last_pong(&self) -> Duration {
        self.last_pong
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Stop the background task. Later calls do nothing.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
