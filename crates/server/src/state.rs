use std::sync::Arc;

use velo_dispatch::Dispatcher;

pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Bearer token runners must present. `None` disables the check.
    pub runner_token: Option<String>,
}

impl AppState {
    /// Run a dispatcher call on the blocking pool.
    ///
    /// Dispatcher methods take std locks and may touch the queue file.
    pub async fn with_dispatcher<T, F>(&self, f: F) -> Result<T, tokio::task::JoinError>
    where
        F: FnOnce(&Dispatcher) -> T + Send + 'static,
        T: Send + 'static,
    {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::task::spawn_blocking(move || f(&dispatcher)).await
    }
}
