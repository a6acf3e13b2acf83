use courier_ports::{MessageSerializer, SerializationError};
use serde_json::Value;

/// JSON message bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl MessageSerializer for JsonSerializer {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn serialize(&self, value: &Value) -> Result<String, SerializationError> {
        serde_json::to_string(value).map_err(|e| SerializationError::Serialize(e.to_string()))
    }

    fn deserialize(&self, text: &str) -> Result<Value, SerializationError> {
        serde_json::from_str(text).map_err(|e| SerializationError::Deserialize(e.to_string()))
    }
}
