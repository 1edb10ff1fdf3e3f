use thiserror::Error;

/// The runner could not establish or keep its server connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The server answered the handshake with HTTP 401.
    #[error("server rejected the runner token")]
    AuthenticationFailure,

    #[error("invalid server request: {0}")]
    InvalidRequest(String),

    #[error("connection failed: {0}")]
    Failure(#[from] tokio_tungstenite::tungstenite::Error),
}

/// A benchmark did not produce a result.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("benchmark cancelled: {reason}")]
    ProgramCancelled { reason: String },

    #[error("could not start benchmark: {0}")]
    Spawn(#[from] std::io::Error),
}
