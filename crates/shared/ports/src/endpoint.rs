use async_trait::async_trait;
use courier_core::{Destination, MessageId, TextMessage};
use std::time::Duration;

use crate::error::BrokerResult;

/// A message handed out by a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: MessageId,
    /// Destination the message was received from
    pub destination: Destination,
    /// Broker-side delivery counter, 1 on first delivery
    pub delivery_count: u32,
    pub message: TextMessage,
}

impl Delivery {
    pub fn is_redelivered(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Sends messages to one destination
#[async_trait]
pub trait MessageProducer: Send + Sync {
    fn destination(&self) -> &Destination;

    async fn send(&self, message: &TextMessage) -> BrokerResult<()>;

    /// Release the producer; must be called exactly once
    async fn close(&self) -> BrokerResult<()>;
}

/// Receives messages from one destination
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    fn destination(&self) -> &Destination;

    /// Wait up to `timeout` for the next message
    async fn receive(&self, timeout: Duration) -> BrokerResult<Option<Delivery>>;

    /// Release the consumer; must be called exactly once
    async fn close(&self) -> BrokerResult<()>;
}
