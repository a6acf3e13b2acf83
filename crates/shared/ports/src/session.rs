use async_trait::async_trait;
use courier_core::{Destination, DestinationKind};

use crate::endpoint::{MessageConsumer, MessageProducer};
use crate::error::BrokerResult;

/// How receipt of a message is acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AcknowledgementMode {
    /// Receives and sends are grouped into commit/rollback units
    #[default]
    Transactional,
    /// Messages are acknowledged as soon as they are received
    Auto,
}

/// A single-threaded context for producing and consuming messages
#[async_trait]
pub trait BrokerSession: Send + Sync {
    fn acknowledgement_mode(&self) -> AcknowledgementMode;

    fn is_transacted(&self) -> bool {
        self.acknowledgement_mode() == AcknowledgementMode::Transactional
    }

    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> BrokerResult<Box<dyn MessageProducer>>;

    async fn create_consumer(
        &self,
        destination: &Destination,
    ) -> BrokerResult<Box<dyn MessageConsumer>>;

    /// Durable topic subscription identified by `subscriber_id`
    async fn create_durable_consumer(
        &self,
        topic: &Destination,
        subscriber_id: &str,
    ) -> BrokerResult<Box<dyn MessageConsumer>>;

    /// Destination scoped to the owning connection, removed when it closes
    async fn create_temporary_destination(
        &self,
        kind: DestinationKind,
    ) -> BrokerResult<Destination>;

    /// Release a temporary destination before its connection closes
    async fn delete_temporary_destination(&self, destination: &Destination) -> BrokerResult<()>;

    /// Acknowledge received messages and publish buffered sends
    async fn commit(&self) -> BrokerResult<()>;

    /// Return received messages for redelivery and drop buffered sends
    async fn rollback(&self) -> BrokerResult<()>;

    /// Release the session; must be called exactly once
    async fn close(&self) -> BrokerResult<()>;
}
