use serde::{Deserialize, Serialize};

/// Destination kind (Queue or Topic)
///
/// Broker-specific temporary variants are normalized to the kind of their
/// physical counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DestinationKind {
    /// Point-to-point: each message is consumed by exactly one consumer
    #[default]
    Queue,
    /// Publish/subscribe: each active subscriber gets a copy
    Topic,
}

impl DestinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Queue => "Queue",
            DestinationKind::Topic => "Topic",
        }
    }
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
