use courier_core::{Destination, DestinationKind, TextMessage};
use log::debug;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::time::Instant;
use uuid::Uuid;

use crate::model::{Source, StoredMessage, destination_key};

#[derive(Debug)]
struct Subscription {
    topic: String,
    buffer: VecDeque<StoredMessage>,
    durable_key: Option<String>,
    active: bool,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    subscriptions: HashMap<u64, Subscription>,
    durable: HashMap<String, u64>,
}

/// Message store shared by every simulated connection
///
/// Queues deliver each message to one consumer in FIFO order; rolled-back
/// messages go back to the front. Topics copy each message to every active
/// subscription and to inactive durable ones.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    next_subscription: AtomicU64,
    next_temporary: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a message to a queue or topic
    pub fn publish(&self, destination: &Destination, message: TextMessage) {
        let key = destination_key(destination);
        let stored = StoredMessage {
            id: format!("ID:{}", Uuid::new_v4()),
            destination: destination.clone(),
            message,
            delivery_count: 1,
            enqueued_at: Instant::now(),
        };

        {
            let mut state = self.state.lock();
            match destination.kind() {
                DestinationKind::Queue => {
                    state.queues.entry(key).or_default().push_back(stored);
                }
                DestinationKind::Topic => {
                    for subscription in state.subscriptions.values_mut() {
                        if subscription.topic == key
                            && (subscription.active || subscription.durable_key.is_some())
                        {
                            subscription.buffer.push_back(stored.clone());
                        }
                    }
                }
            }
        }
        self.notify.notify_waiters();
    }

    /// Next deliverable message for a source, skipping expired ones
    pub(crate) fn pop(&self, source: &Source) -> Option<StoredMessage> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let buffer = match source {
            Source::Queue(key) => state.queues.get_mut(key)?,
            Source::Subscription(id) => &mut state.subscriptions.get_mut(id)?.buffer,
        };
        while let Some(stored) = buffer.pop_front() {
            if stored.is_expired(now) {
                debug!("Dropping expired message {} on {}", stored.id, stored.destination);
                continue;
            }
            return Some(stored);
        }
        None
    }

    /// Put a rolled-back message back at the head of its source
    pub(crate) fn requeue(&self, source: &Source, mut stored: StoredMessage) {
        stored.delivery_count = stored.delivery_count.saturating_add(1);
        {
            let mut state = self.state.lock();
            match source {
                Source::Queue(key) => {
                    state.queues.entry(key.clone()).or_default().push_front(stored);
                }
                Source::Subscription(id) => {
                    if let Some(subscription) = state.subscriptions.get_mut(id) {
                        subscription.buffer.push_front(stored);
                    }
                }
            }
        }
        self.notify.notify_waiters();
    }

    /// Register a topic subscription; durable keys resume an earlier one
    pub(crate) fn subscribe(&self, topic: &Destination, durable_key: Option<String>) -> u64 {
        let key = destination_key(topic);
        let mut state = self.state.lock();

        if let Some(existing) = durable_key.as_ref().and_then(|k| state.durable.get(k)).copied() {
            if let Some(subscription) = state.subscriptions.get_mut(&existing) {
                subscription.active = true;
                return existing;
            }
        }

        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(durable) = &durable_key {
            state.durable.insert(durable.clone(), id);
        }
        state.subscriptions.insert(
            id,
            Subscription {
                topic: key,
                buffer: VecDeque::new(),
                durable_key,
                active: true,
            },
        );
        id
    }

    /// Drop a non-durable subscription; durable ones keep buffering
    pub(crate) fn unsubscribe(&self, id: u64) {
        let mut state = self.state.lock();
        let durable = match state.subscriptions.get_mut(&id) {
            Some(subscription) if subscription.durable_key.is_some() => {
                subscription.active = false;
                true
            }
            Some(_) => false,
            None => return,
        };
        if !durable {
            state.subscriptions.remove(&id);
        }
    }

    /// Allocate a temporary destination name for a connection
    pub(crate) fn create_temporary(&self, kind: DestinationKind, connection_id: u64) -> Destination {
        let n = self.next_temporary.fetch_add(1, Ordering::SeqCst) + 1;
        let scheme = match kind {
            DestinationKind::Queue => "temp-queue",
            DestinationKind::Topic => "temp-topic",
        };
        let uri = format!("{scheme}://courier-sim/ID:conn-{connection_id}:{n}");
        if kind == DestinationKind::Queue {
            self.state
                .lock()
                .queues
                .insert(destination_key(&Destination::queue(uri.as_str())), VecDeque::new());
        }
        Destination::temporary(kind, uri)
    }

    pub(crate) fn delete_temporary(&self, destination: &Destination) {
        let key = destination_key(destination);
        let mut state = self.state.lock();
        state.queues.remove(&key);
        state.subscriptions.retain(|_, s| s.topic != key);
    }

    /// Future resolved on the next publish, requeue or wake-up
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Wake every waiting consumer so it re-checks its connection
    pub(crate) fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    /// Messages waiting on a queue, in delivery order
    pub fn queued(&self, destination: &Destination) -> Vec<TextMessage> {
        self.state
            .lock()
            .queues
            .get(&destination_key(destination))
            .map(|q| q.iter().map(|s| s.message.clone()).collect())
            .unwrap_or_default()
    }

    pub fn queue_depth(&self, destination: &Destination) -> usize {
        self.state
            .lock()
            .queues
            .get(&destination_key(destination))
            .map_or(0, VecDeque::len)
    }

    /// Number of live temporary queues
    pub fn temporary_queue_count(&self) -> usize {
        self.state
            .lock()
            .queues
            .keys()
            .filter(|k| k.starts_with("ID:conn-"))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queue() -> Destination {
        Destination::queue("tcp://localhost:61616/Orders")
    }

    #[test]
    fn test_queue_fifo_and_requeue_front() {
        let broker = InMemoryBroker::new();
        broker.publish(&queue(), TextMessage::new("one"));
        broker.publish(&queue(), TextMessage::new("two"));

        let source = Source::Queue(destination_key(&queue()));
        let first = broker.pop(&source).unwrap();
        assert_eq!(first.message.text, "one");

        broker.requeue(&source, first);
        let again = broker.pop(&source).unwrap();
        assert_eq!(again.message.text, "one");
        assert_eq!(again.delivery_count, 2);
        assert_eq!(broker.pop(&source).unwrap().message.text, "two");
    }

    #[test]
    fn test_hosts_share_queue() {
        let broker = InMemoryBroker::new();
        broker.publish(&queue(), TextMessage::new("hello"));
        assert_eq!(broker.queue_depth(&Destination::queue("tcp://backup:61616/Orders")), 1);
    }

    #[test]
    fn test_topic_fan_out_and_durable_resume() {
        let broker = InMemoryBroker::new();
        let topic = Destination::topic("tcp://localhost:61616/Prices");

        let plain = broker.subscribe(&topic, None);
        let durable = broker.subscribe(&topic, Some("client:sub".into()));
        broker.unsubscribe(durable);

        broker.publish(&topic, TextMessage::new("tick"));
        assert!(broker.pop(&Source::Subscription(plain)).is_some());

        let resumed = broker.subscribe(&topic, Some("client:sub".into()));
        assert_eq!(resumed, durable);
        assert_eq!(
            broker.pop(&Source::Subscription(resumed)).unwrap().message.text,
            "tick"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_messages_are_dropped() {
        let broker = InMemoryBroker::new();
        broker.publish(
            &queue(),
            TextMessage::new("stale").with_expiration(Duration::from_millis(10)),
        );
        tokio::time::advance(Duration::from_millis(20)).await;

        assert!(broker.pop(&Source::Queue(destination_key(&queue()))).is_none());
    }

    #[test]
    fn test_temporary_queue_lifecycle() {
        let broker = InMemoryBroker::new();
        let temp = broker.create_temporary(DestinationKind::Queue, 7);
        assert!(temp.is_temporary());
        assert_eq!(broker.temporary_queue_count(), 1);

        broker.delete_temporary(&temp);
        assert_eq!(broker.temporary_queue_count(), 0);
    }
}
