use async_trait::async_trait;
use courier_core::{Destination, DestinationKind, TextMessage};
use courier_ports::{
    AcknowledgementMode, BrokerFault, BrokerResult, BrokerSession, MessageConsumer,
    MessageProducer,
};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::connection::ConnectionShared;
use super::endpoint::{EndpointShared, SimConsumer, SimProducer};
use crate::application::InMemoryBroker;
use crate::model::{ResourceKind, Source, StoredMessage, destination_key};
use crate::registry::ResourceStats;

/// Work done inside the current transaction
#[derive(Default)]
struct Transaction {
    received: Vec<(Source, StoredMessage)>,
    sends: Vec<(Destination, TextMessage)>,
}

pub(crate) struct SessionShared {
    stats: Arc<ResourceStats>,
    mode: AcknowledgementMode,
    connection: Arc<ConnectionShared>,
    closed: AtomicBool,
    tx: Mutex<Transaction>,
    endpoints: Mutex<Vec<Arc<EndpointShared>>>,
}

impl SessionShared {
    pub(crate) fn stats(&self) -> &Arc<ResourceStats> {
        &self.stats
    }

    pub(crate) fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.connection.broker
    }

    pub(crate) fn is_delivering(&self) -> bool {
        self.connection.is_started()
    }

    pub(crate) fn check_open(&self) -> BrokerResult<()> {
        self.connection.check_open()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerFault::protocol("session is closed"));
        }
        Ok(())
    }

    fn is_transacted(&self) -> bool {
        self.mode == AcknowledgementMode::Transactional
    }

    pub(crate) fn on_receive(&self, source: Source, stored: StoredMessage) {
        if self.is_transacted() {
            self.tx.lock().received.push((source, stored));
        }
    }

    pub(crate) fn on_send(&self, destination: &Destination, message: &TextMessage) {
        self.stats.record_send(message);
        if self.is_transacted() {
            self.tx
                .lock()
                .sends
                .push((destination.clone(), message.clone()));
        } else {
            self.broker().publish(destination, message.clone());
        }
    }

    /// Return uncommitted receives to the broker and drop buffered sends
    pub(crate) fn abandon(&self) {
        let tx = std::mem::take(&mut *self.tx.lock());
        for (source, stored) in tx.received.into_iter().rev() {
            self.broker().requeue(&source, stored);
        }
    }

    /// Close children and release the transaction; false if already closed
    pub(crate) fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let endpoints: Vec<_> = self.endpoints.lock().drain(..).collect();
        for endpoint in endpoints {
            if endpoint.shutdown() {
                endpoint.stats().record_dispose();
            }
        }
        self.abandon();
        true
    }

    fn register_endpoint(&self, kind: ResourceKind, destination: &Destination, subscription: Option<u64>) -> Arc<EndpointShared> {
        let stats = self.connection.registry.register(kind, destination.uri());
        let endpoint = Arc::new(EndpointShared::new(
            stats,
            subscription,
            Arc::clone(self.broker()),
        ));
        self.endpoints.lock().push(Arc::clone(&endpoint));
        endpoint
    }
}

/// Simulated session; transacted sessions buffer sends until commit
pub struct SimSession {
    shared: Arc<SessionShared>,
}

impl SimSession {
    pub(crate) fn new(connection: Arc<ConnectionShared>, mode: AcknowledgementMode) -> Self {
        let stats = connection
            .registry
            .register(ResourceKind::Session, connection.uri.as_str());
        Self {
            shared: Arc::new(SessionShared {
                stats,
                mode,
                connection,
                closed: AtomicBool::new(false),
                tx: Mutex::new(Transaction::default()),
                endpoints: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn shared(&self) -> Arc<SessionShared> {
        Arc::clone(&self.shared)
    }

    fn consumer(&self, destination: &Destination, source: Source, subscription: Option<u64>) -> Box<dyn MessageConsumer> {
        let endpoint = self
            .shared
            .register_endpoint(ResourceKind::Consumer, destination, subscription);
        Box::new(SimConsumer::new(
            destination.clone(),
            source,
            endpoint,
            Arc::clone(&self.shared),
        ))
    }

    fn ensure_transacted(&self, operation: &str) -> BrokerResult<()> {
        if !self.shared.is_transacted() {
            return Err(BrokerFault::protocol(format!(
                "{operation} requires a transacted session"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerSession for SimSession {
    fn acknowledgement_mode(&self) -> AcknowledgementMode {
        self.shared.mode
    }

    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> BrokerResult<Box<dyn MessageProducer>> {
        self.shared.check_open()?;
        let endpoint = self
            .shared
            .register_endpoint(ResourceKind::Producer, destination, None);
        Ok(Box::new(SimProducer::new(
            destination.clone(),
            endpoint,
            Arc::clone(&self.shared),
        )))
    }

    async fn create_consumer(
        &self,
        destination: &Destination,
    ) -> BrokerResult<Box<dyn MessageConsumer>> {
        self.shared.check_open()?;
        let (source, subscription) = match destination.kind() {
            DestinationKind::Queue => (Source::Queue(destination_key(destination)), None),
            DestinationKind::Topic => {
                let id = self.shared.broker().subscribe(destination, None);
                (Source::Subscription(id), Some(id))
            }
        };
        Ok(self.consumer(destination, source, subscription))
    }

    async fn create_durable_consumer(
        &self,
        topic: &Destination,
        subscriber_id: &str,
    ) -> BrokerResult<Box<dyn MessageConsumer>> {
        self.shared.check_open()?;
        if !topic.is_topic() {
            return Err(BrokerFault::protocol(format!(
                "durable subscriptions require a topic, got {topic}"
            )));
        }
        let client_id = self.shared.connection.client_id().ok_or_else(|| {
            BrokerFault::protocol("durable subscriptions require a client id")
        })?;

        let key = format!("{client_id}:{subscriber_id}");
        let id = self.shared.broker().subscribe(topic, Some(key));
        debug!("Durable subscriber {} attached to {}", subscriber_id, topic);
        Ok(self.consumer(topic, Source::Subscription(id), Some(id)))
    }

    async fn create_temporary_destination(
        &self,
        kind: DestinationKind,
    ) -> BrokerResult<Destination> {
        self.shared.check_open()?;
        let destination = self
            .shared
            .broker()
            .create_temporary(kind, self.shared.connection.id);
        self.shared.connection.track_temporary(destination.clone());
        Ok(destination)
    }

    async fn delete_temporary_destination(&self, destination: &Destination) -> BrokerResult<()> {
        self.shared.connection.check_open()?;
        if !destination.is_temporary() {
            return Err(BrokerFault::protocol(format!(
                "{destination} is not a temporary destination"
            )));
        }
        self.shared.broker().delete_temporary(destination);
        self.shared.connection.forget_temporary(destination);
        Ok(())
    }

    async fn commit(&self) -> BrokerResult<()> {
        self.shared.check_open()?;
        self.ensure_transacted("commit")?;

        let tx = std::mem::take(&mut *self.shared.tx.lock());
        for (destination, message) in tx.sends {
            self.shared.broker().publish(&destination, message);
        }
        self.shared.stats.record_commit();
        Ok(())
    }

    async fn rollback(&self) -> BrokerResult<()> {
        self.shared.check_open()?;
        self.ensure_transacted("rollback")?;

        self.shared.abandon();
        self.shared.stats.record_rollback();
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        self.shared.stats.record_dispose();
        self.shared.shutdown();
        Ok(())
    }
}
