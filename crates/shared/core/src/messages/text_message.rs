use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::destination::Destination;
use crate::values::{CorrelationId, duration_ms};

/// Longest time a message lives on the broker unless overridden
pub const MAX_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Normalized broker message
///
/// Decoupled from any broker SDK message type. Producers build it before
/// sending; consumers treat it as read-only.
///
/// Defaults: `persist = true` and `expiration = MAX_EXPIRATION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Destination>,
    #[serde(default = "default_persist")]
    pub persist: bool,
    #[serde(rename = "expirationMs", with = "duration_ms", default = "default_expiration")]
    pub expiration: Duration,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

fn default_persist() -> bool {
    true
}

fn default_expiration() -> Duration {
    MAX_EXPIRATION
}

impl TextMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            correlation_id: None,
            session_id: None,
            reply_to: None,
            persist: default_persist(),
            expiration: default_expiration(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: Destination) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Correlation id, generating a fresh one first if unset
    pub fn ensure_correlation_id(&mut self) -> &str {
        self.correlation_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .as_str()
    }

    /// Build a reply carrying this message's correlation and session ids
    pub fn reply(&self, text: impl Into<String>) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            session_id: self.session_id.clone(),
            ..Self::new(text)
        }
    }
}

impl std::fmt::Display for TextMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TextMessage(correlation_id={:?}, reply_to={:?}, persist={}, text={})",
            self.correlation_id,
            self.reply_to.as_ref().map(Destination::uri),
            self.persist,
            self.text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let msg = TextMessage::new("Hello");
        assert!(msg.persist);
        assert_eq!(msg.expiration, MAX_EXPIRATION);
        assert!(msg.correlation_id.is_none());
        assert!(msg.properties.is_empty());
    }

    #[test]
    fn test_ensure_correlation_id_keeps_existing() {
        let mut msg = TextMessage::new("Hello").with_correlation_id("abc");
        assert_eq!(msg.ensure_correlation_id(), "abc");

        let mut fresh = TextMessage::new("Hello");
        let generated = fresh.ensure_correlation_id().to_string();
        assert!(Uuid::parse_str(&generated).is_ok());
        assert_eq!(fresh.correlation_id.as_deref(), Some(generated.as_str()));
    }

    #[test]
    fn test_reply_copies_ids_only() {
        let request = TextMessage::new("Hello")
            .with_correlation_id("c-1")
            .with_session_id("s-1")
            .with_reply_to(Destination::queue("temp-queue://conn/1"))
            .with_property("k", "v");

        let reply = request.reply("olleH");
        assert_eq!(reply.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(reply.session_id.as_deref(), Some("s-1"));
        assert!(reply.reply_to.is_none());
        assert!(reply.properties.is_empty());
    }

    #[test]
    fn test_structured_fields_survive_serialization() {
        let original = TextMessage::new("<payload/>")
            .with_correlation_id("c-42")
            .with_session_id("session-7")
            .with_persist(false)
            .with_expiration(Duration::from_secs(90))
            .with_reply_to(Destination::topic("tcp://localhost:61616/Replies"))
            .with_property("priority", "high");

        let json = serde_json::to_string(&original).unwrap();
        let restored: TextMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, original);
        assert!(json.contains("\"expirationMs\":90000"));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let restored: TextMessage = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(restored.persist);
        assert_eq!(restored.expiration, MAX_EXPIRATION);
    }
}
