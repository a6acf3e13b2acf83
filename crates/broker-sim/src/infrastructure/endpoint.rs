use async_trait::async_trait;
use courier_core::{Destination, TextMessage};
use courier_ports::{BrokerFault, BrokerResult, Delivery, MessageConsumer, MessageProducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::session::SessionShared;
use crate::application::InMemoryBroker;
use crate::model::Source;
use crate::registry::ResourceStats;

pub(crate) struct EndpointShared {
    stats: Arc<ResourceStats>,
    closed: AtomicBool,
    subscription: Option<u64>,
    broker: Arc<InMemoryBroker>,
}

impl EndpointShared {
    pub(crate) fn new(
        stats: Arc<ResourceStats>,
        subscription: Option<u64>,
        broker: Arc<InMemoryBroker>,
    ) -> Self {
        Self {
            stats,
            closed: AtomicBool::new(false),
            subscription,
            broker,
        }
    }

    pub(crate) fn stats(&self) -> &Arc<ResourceStats> {
        &self.stats
    }

    /// Release the subscription; false if already closed
    pub(crate) fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(id) = self.subscription {
            self.broker.unsubscribe(id);
        }
        true
    }

    fn check_open(&self, what: &str) -> BrokerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerFault::protocol(format!("{what} is closed")));
        }
        Ok(())
    }
}

pub struct SimProducer {
    destination: Destination,
    endpoint: Arc<EndpointShared>,
    session: Arc<SessionShared>,
}

impl SimProducer {
    pub(crate) fn new(
        destination: Destination,
        endpoint: Arc<EndpointShared>,
        session: Arc<SessionShared>,
    ) -> Self {
        Self {
            destination,
            endpoint,
            session,
        }
    }
}

#[async_trait]
impl MessageProducer for SimProducer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn send(&self, message: &TextMessage) -> BrokerResult<()> {
        self.session.check_open()?;
        self.endpoint.check_open("producer")?;

        self.endpoint.stats.record_send(message);
        self.session.on_send(&self.destination, message);
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        self.endpoint.stats.record_dispose();
        self.endpoint.shutdown();
        Ok(())
    }
}

/// Consumer over a queue or topic subscription
///
/// Nothing is delivered until the owning connection has been started.
pub struct SimConsumer {
    destination: Destination,
    source: Source,
    endpoint: Arc<EndpointShared>,
    session: Arc<SessionShared>,
}

impl SimConsumer {
    pub(crate) fn new(
        destination: Destination,
        source: Source,
        endpoint: Arc<EndpointShared>,
        session: Arc<SessionShared>,
    ) -> Self {
        Self {
            destination,
            source,
            endpoint,
            session,
        }
    }

    fn check_open(&self) -> BrokerResult<()> {
        self.session.check_open()?;
        self.endpoint.check_open("consumer")
    }
}

#[async_trait]
impl MessageConsumer for SimConsumer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn receive(&self, timeout: Duration) -> BrokerResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        let broker = Arc::clone(self.session.broker());

        loop {
            // Register interest before checking so a publish in between is not missed
            let notified = broker.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.check_open()?;
            if self.session.is_delivering() {
                if let Some(stored) = broker.pop(&self.source) {
                    let delivery = Delivery {
                        message_id: stored.id.clone(),
                        destination: stored.destination.clone(),
                        delivery_count: stored.delivery_count,
                        message: stored.message.clone(),
                    };
                    self.session.on_receive(self.source.clone(), stored);
                    return Ok(Some(delivery));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                self.check_open()?;
                return Ok(None);
            }
        }
    }

    async fn close(&self) -> BrokerResult<()> {
        self.endpoint.stats.record_dispose();
        self.endpoint.shutdown();
        Ok(())
    }
}
