use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// A payload type that can travel inside an [`Envelope`].
///
/// `IDENTIFIER` is the short variant tag (e.g. `"WorkOrder"`), not a type path,
/// so renaming or moving the Rust type does not change the wire format.
pub trait Entity: Serialize + DeserializeOwned {
    const IDENTIFIER: &'static str;
}

/// Wire-format wrapper: the JSON-encoded payload plus its type identifier.
///
/// ```json
/// {"payload": "{\"commit_hash\":\"abc\"}", "identifier": "UpdateBenchmarkRepoOrder"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// JSON-encoded entity.
    pub payload: String,
    /// Identifier of the entity type inside `payload`.
    pub identifier: String,
}

/// Only the identifier; the payload string is skipped, not decoded.
#[derive(Deserialize)]
struct IdentifierOnly {
    identifier: String,
}

/// Wrap an entity into a wire string.
pub fn serialize<E: Entity>(entity: &E) -> Result<String, WireError> {
    let envelope = Envelope {
        payload: serde_json::to_string(entity)?,
        identifier: E::IDENTIFIER.to_string(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Read the type identifier of a wire string without decoding its payload.
pub fn peek_type(wire: &str) -> Result<String, WireError> {
    let peeked: IdentifierOnly = serde_json::from_str(wire)?;
    Ok(peeked.identifier)
}

/// Decode a wire string that must carry an `E`.
pub fn deserialize<E: Entity>(wire: &str) -> Result<E, WireError> {
    let envelope: Envelope = serde_json::from_str(wire)?;
    if envelope.identifier != E::IDENTIFIER {
        return Err(WireError::UnexpectedType {
            expected: E::IDENTIFIER,
            found: envelope.identifier,
        });
    }
    Ok(serde_json::from_str(&envelope.payload)?)
}
