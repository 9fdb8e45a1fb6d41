use serde::Serialize;
use sha2::{Digest, Sha256};

/// Deterministic identifier for one logical request: operation type, actor
/// identity and the serialized payload, never time or arrival order. The
/// payload is hashed from the typed request struct (fixed field order), so
/// differently ordered wire JSON still maps to one fingerprint.
pub fn derive<T: Serialize>(operation: &str, actor: &str, payload: &T) -> String {
    let payload_json = serde_json::to_string(payload).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b"|");
    hasher.update(actor.as_bytes());
    hasher.update(b"|");
    hasher.update(payload_json.as_bytes());

    hex::encode(hasher.finalize())
}
