use async_trait::async_trait;
use courier_core::{CorrelationId, Destination, DestinationKind, TextMessage};
use courier_ports::{BrokerFault, BrokerResult, BrokerSession, MessageConsumer};
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use super::one_way::{OneWayClient, discard, produce};
use crate::connection::ConnectionManager;
use crate::dispose::{close_consumer, delete_temporary};
use crate::error::{GatewayError, Result};
use crate::transport::{Publisher, Requester};

/// How long a single receive call waits before re-checking the deadline
const RECEIVE_POLL: Duration = Duration::from_millis(100);

/// Ticket returned by [`ReplyClient::begin_send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    correlation_id: CorrelationId,
    reply_to: Destination,
}

impl PendingReply {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Temporary destination the reply is expected on
    pub fn reply_to(&self) -> &Destination {
        &self.reply_to
    }
}

struct ReplyConsumer {
    generation: u64,
    reply_to: Destination,
    consumer: Box<dyn MessageConsumer>,
}

/// Request/reply over a temporary reply queue
///
/// Every request gets its own temporary queue and consumer, keyed by
/// correlation id until [`end_send`] or [`close`] releases them.
///
/// [`end_send`]: ReplyClient::end_send
/// [`close`]: ReplyClient::close
pub struct ReplyClient {
    client: OneWayClient,
    pending: DashMap<CorrelationId, ReplyConsumer>,
}

impl ReplyClient {
    pub fn new(manager: Arc<ConnectionManager>, destination: Destination) -> Self {
        Self {
            client: OneWayClient::new(manager, destination),
            pending: DashMap::new(),
        }
    }

    /// The underlying one-way client
    pub fn one_way(&self) -> &OneWayClient {
        &self.client
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.client.destination()
    }

    /// Requests sent but not yet ended
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub async fn send_one_way(&self, message: &TextMessage) -> Result<()> {
        self.client.send_one_way(message).await
    }

    pub async fn send_to(&self, destination: &Destination, message: &TextMessage) -> Result<()> {
        self.client.send_to(destination, message).await
    }

    /// Send a request and wait up to `timeout` for its reply
    pub async fn send(&self, message: TextMessage, timeout: Duration) -> Result<TextMessage> {
        let pending = self.begin_send(message).await?;
        self.end_send(&pending, timeout).await
    }

    /// Send a request with a fresh temporary reply queue
    ///
    /// The correlation id is generated unless the message already has one.
    pub async fn begin_send(&self, mut message: TextMessage) -> Result<PendingReply> {
        self.client.ensure_open()?;
        let destination = self
            .client
            .destination()
            .cloned()
            .ok_or(GatewayError::NoDestination)?;
        let correlation_id = message.ensure_correlation_id().to_string();

        let manager = Arc::clone(self.client.manager());
        let mut recovery = manager.recovery();
        let mut slot = self.client.session.lock().await;

        loop {
            let generation = self.client.ensure_session(&mut slot, &mut recovery).await?;
            let Some(current) = slot.as_ref() else {
                continue;
            };
            let opened = open_request(current.session.as_ref(), &destination, &mut message).await;
            match opened {
                Ok((reply_to, consumer)) => {
                    debug!(
                        "Request {} sent to {}, awaiting reply on {}",
                        correlation_id, destination, reply_to
                    );
                    self.pending.insert(
                        correlation_id.clone(),
                        ReplyConsumer {
                            generation,
                            reply_to: reply_to.clone(),
                            consumer,
                        },
                    );
                    return Ok(PendingReply {
                        correlation_id,
                        reply_to,
                    });
                }
                Err(fault) => {
                    if fault.is_transport() {
                        discard(slot.take()).await;
                    }
                    recovery.recover(generation, fault).await?;
                }
            }
        }
    }

    /// Wait for the reply to `pending`; its consumer and temporary queue are
    /// released whatever the outcome
    pub async fn end_send(&self, pending: &PendingReply, timeout: Duration) -> Result<TextMessage> {
        let (_, entry) = self
            .pending
            .remove(&pending.correlation_id)
            .ok_or_else(|| GatewayError::UnknownReply(pending.correlation_id.clone()))?;
        let generation = entry.generation;

        let waited = tokio::time::timeout(
            timeout,
            await_reply(entry.consumer.as_ref(), &pending.correlation_id),
        )
        .await;
        self.release(entry).await;

        match waited {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(fault)) => {
                // The temporary queue died with its connection, so even a
                // successful reconnect cannot bring this reply back
                if fault.is_transport() {
                    let manager = self.client.manager();
                    if let Err(e) = manager.report_fault(generation, fault.clone()).await {
                        warn!(
                            "Reconnect after losing reply consumer for {} failed: {}",
                            pending.correlation_id, e
                        );
                        return Err(GatewayError::Connection(e));
                    }
                }
                Err(GatewayError::ReplyLost {
                    correlation_id: pending.correlation_id.clone(),
                    source: fault,
                })
            }
            Err(_) => {
                warn!(
                    "No reply for {} within {:?}",
                    pending.correlation_id, timeout
                );
                Err(GatewayError::Timeout {
                    correlation_id: pending.correlation_id.clone(),
                    timeout,
                })
            }
        }
    }

    /// Release outstanding reply consumers and the session
    pub async fn close(&self) {
        let outstanding: Vec<CorrelationId> =
            self.pending.iter().map(|e| e.key().clone()).collect();
        for correlation_id in outstanding {
            if let Some((_, entry)) = self.pending.remove(&correlation_id) {
                debug!("Releasing unanswered request {}", correlation_id);
                self.release(entry).await;
            }
        }
        self.client.close().await;
    }

    async fn release(&self, entry: ReplyConsumer) {
        close_consumer(entry.consumer.as_ref()).await;

        // Temporary queues die with their connection, so a stale one needs no delete
        let slot = self.client.session.lock().await;
        if let Some(current) = slot.as_ref() {
            if current.generation == entry.generation {
                delete_temporary(current.session.as_ref(), &entry.reply_to).await;
            }
        }
    }
}

/// Temporary queue, reply consumer, then the request itself
async fn open_request(
    session: &dyn BrokerSession,
    destination: &Destination,
    message: &mut TextMessage,
) -> BrokerResult<(Destination, Box<dyn MessageConsumer>)> {
    let reply_to = session
        .create_temporary_destination(DestinationKind::Queue)
        .await?;

    let consumer = match session.create_consumer(&reply_to).await {
        Ok(consumer) => consumer,
        Err(fault) => {
            delete_temporary(session, &reply_to).await;
            return Err(fault);
        }
    };

    message.reply_to = Some(reply_to.clone());
    if let Err(fault) = produce(session, destination, message).await {
        close_consumer(consumer.as_ref()).await;
        delete_temporary(session, &reply_to).await;
        return Err(fault);
    }
    Ok((reply_to, consumer))
}

/// Receive until a message with the expected correlation id arrives
async fn await_reply(
    consumer: &dyn MessageConsumer,
    correlation_id: &str,
) -> std::result::Result<TextMessage, BrokerFault> {
    loop {
        let Some(delivery) = consumer.receive(RECEIVE_POLL).await? else {
            continue;
        };
        if delivery.message.correlation_id.as_deref() == Some(correlation_id) {
            return Ok(delivery.message);
        }
        warn!(
            "Discarding reply with correlation id {:?} while waiting for {}",
            delivery.message.correlation_id, correlation_id
        );
    }
}

#[async_trait]
impl Publisher for ReplyClient {
    async fn publish(&self, message: &TextMessage) -> Result<()> {
        self.client.send_one_way(message).await
    }

    async fn publish_to(&self, destination: &Destination, message: &TextMessage) -> Result<()> {
        self.client.send_to(destination, message).await
    }
}

#[async_trait]
impl Requester for ReplyClient {
    async fn request(&self, message: TextMessage, timeout: Duration) -> Result<TextMessage> {
        self.send(message, timeout).await
    }
}
