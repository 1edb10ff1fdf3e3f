//! Wire protocol between the dispatch server and benchmark runners.
//!
//! Every message is a payload struct tagged with a short identifier and
//! wrapped in an [`Envelope`]. The identifier can be read without decoding
//! the payload, which lets receivers dispatch by type first.

pub mod close;
pub mod envelope;
pub mod error;
pub mod messages;

pub use close::CloseCode;
pub use envelope::{deserialize, peek_type, serialize, Entity, Envelope};
pub use error::WireError;
pub use messages::*;

/// Handshake header carrying the connecting runner's name.
pub const RUNNER_NAME_HEADER: &str = "x-runner-name";
