//! Opaque request/response payloads.
//!
//! The toolkit never interprets business payloads. A [`Payload`] carries the
//! serialized bytes that go on the wire plus a schema-less [`Metadata`] view
//! used for audit rows, so typed call sites keep full ownership of their
//! (de)serialization while the toolkit can still log what was sent.

use crate::error::CallError;
use serde::Serialize;

/// Schema-less key-value view of a JSON document.
///
/// Used wherever a payload needs to be persisted for audit without the
/// toolkit knowing its shape (call logs, acknowledge records, cached
/// responses).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A serialized request body plus its audit view.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Short type name of the value this payload was built from, kept so the
    /// acknowledge audit trail can say what was reserved.
    pub name: String,
    /// Wire bytes (JSON).
    pub bytes: Vec<u8>,
    /// Key-value view for audit rows. Empty when the payload is not a JSON
    /// object.
    pub view: Metadata,
}

impl Payload {
    /// Serialize `value` into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Serialize`] when `value` cannot be serialized to
    /// JSON.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, CallError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CallError::Serialize(e.to_string()))?;

        let view = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Metadata::new(),
        };

        let name = std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or("payload")
            .to_string();

        Ok(Self { name, bytes, view })
    }

    /// The wire bytes as a UTF-8 string, for cache keys and logging.
    #[must_use]
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}
