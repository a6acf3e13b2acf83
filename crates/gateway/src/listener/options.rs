use courier_core::{Destination, DestinationUri};
use courier_ports::AcknowledgementMode;
use std::time::Duration;

/// Listener behaviour beyond the destination itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Queue name (or full URI) receiving messages past the redelivery bound
    pub dead_letter_queue: Option<String>,
    /// Rollbacks allowed per message; `None` means unbounded
    pub max_redelivery_count: Option<u32>,
    /// Durable subscription name for topic destinations
    pub durable_subscriber_id: Option<String>,
    pub acknowledgement_mode: AcknowledgementMode,
    /// How long one receive call blocks before the loop re-checks for shutdown
    pub receive_timeout: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            dead_letter_queue: None,
            max_redelivery_count: None,
            durable_subscriber_id: None,
            acknowledgement_mode: AcknowledgementMode::Transactional,
            receive_timeout: Duration::from_millis(100),
        }
    }
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dead_letter_queue(mut self, queue: impl Into<String>) -> Self {
        self.dead_letter_queue = Some(queue.into());
        self
    }

    pub fn with_max_redelivery_count(mut self, count: u32) -> Self {
        self.max_redelivery_count = Some(count);
        self
    }

    pub fn with_durable_subscriber_id(mut self, id: impl Into<String>) -> Self {
        self.durable_subscriber_id = Some(id.into());
        self
    }

    pub fn with_acknowledgement_mode(mut self, mode: AcknowledgementMode) -> Self {
        self.acknowledgement_mode = mode;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Dead-letter queue on `host`; a configured full URI is used as is
    pub fn dead_letter_destination(&self, host: &str) -> Option<Destination> {
        let queue = self.dead_letter_queue.as_deref()?;
        if queue.contains("://") {
            return Some(Destination::queue(queue));
        }
        Some(Destination::queue(DestinationUri::new(host, queue).uri()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_queue_resolved_on_host() {
        let options = ListenerOptions::new().with_dead_letter_queue("Orders.DLQ");
        let dlq = options.dead_letter_destination("tcp://localhost:61616").unwrap();
        assert_eq!(dlq.uri(), "tcp://localhost:61616/Orders.DLQ");
        assert!(dlq.is_queue());

        let absolute = ListenerOptions::new().with_dead_letter_queue("tcp://dlq:61616/Poison");
        assert_eq!(
            absolute.dead_letter_destination("tcp://localhost:61616").unwrap().uri(),
            "tcp://dlq:61616/Poison"
        );
        assert!(ListenerOptions::new().dead_letter_destination("tcp://x:1").is_none());
    }
}
