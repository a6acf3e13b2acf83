use courier_core::{Destination, DestinationUri, MessageId, TextMessage};
use tokio::time::Instant;

/// Kind of resource tracked by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Connection,
    Session,
    Producer,
    Consumer,
}

/// A message held by the broker
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: MessageId,
    pub destination: Destination,
    pub message: TextMessage,
    pub delivery_count: u32,
    pub enqueued_at: Instant,
}

impl StoredMessage {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.enqueued_at) > self.message.expiration
    }
}

/// Where a consumer pulls messages from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Queue(String),
    Subscription(u64),
}

/// Storage key for a destination
///
/// The simulator acts as one broker network: `tcp://a/Orders` and
/// `tcp://b/Orders` address the same queue.
pub fn destination_key(destination: &Destination) -> String {
    DestinationUri::parse(destination.uri()).path().to_string()
}
