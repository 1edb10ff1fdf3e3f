use thiserror::Error;

/// Raised when a task cannot be created.
///
/// `our_fault` separates caller mistakes (bad input, unresolvable commit)
/// from internal failures (storage unavailable). The caller-facing message
/// differs accordingly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskCreationError {
    pub message: String,
    pub our_fault: bool,
}

impl TaskCreationError {
    /// The request itself was invalid.
    pub fn caller(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            our_fault: false,
        }
    }

    /// The request was fine but we failed to act on it.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            our_fault: true,
        }
    }

    /// Message suitable for showing to whoever submitted the task.
    pub fn public_message(&self) -> String {
        if self.our_fault {
            format!("internal error while creating task: {}", self.message)
        } else {
            format!("invalid task: {}", self.message)
        }
    }
}

/// Violations of data model invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("measurement values must not be empty")]
    EmptyValues,

    #[error("duplicate measurement for dimension {0}")]
    DuplicateDimension(String),

    #[error("invalid dimension '{0}', expected 'benchmark:metric'")]
    InvalidDimension(String),
}
