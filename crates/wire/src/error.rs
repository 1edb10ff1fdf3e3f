use thiserror::Error;

/// A message could not be encoded or decoded.
///
/// Always fatal to the single message only; the connection stays up.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected message type '{expected}', found '{found}'")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },

    #[error("unknown message type '{0}'")]
    UnknownType(String),
}

impl WireError {
    /// True when the envelope was fine but carried a type this side does not handle.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, WireError::UnknownType(_))
    }
}
