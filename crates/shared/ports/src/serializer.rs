use serde_json::Value;

use crate::error::SerializationError;

/// Payload marshaling between structured values and message bodies
///
/// Implementations choose the wire format (JSON, XML, ...). Typed request and
/// response shapes are converted to and from [`Value`] by the caller.
pub trait MessageSerializer: Send + Sync {
    /// Format name, for diagnostics
    fn content_type(&self) -> &str;

    fn serialize(&self, value: &Value) -> Result<String, SerializationError>;

    fn deserialize(&self, text: &str) -> Result<Value, SerializationError>;
}
