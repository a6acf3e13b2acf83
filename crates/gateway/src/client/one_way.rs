use async_trait::async_trait;
use courier_core::{Destination, TextMessage};
use courier_ports::{AcknowledgementMode, BrokerResult, BrokerSession};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::connection::{ConnectionManager, Recovery};
use crate::dispose::{close_producer, close_session};
use crate::error::{GatewayError, Result};
use crate::transport::Publisher;

/// Client session bound to the connection generation it was created on
pub(crate) struct ClientSession {
    pub(crate) generation: u64,
    pub(crate) session: Box<dyn BrokerSession>,
}

/// Fire-and-forget sender
///
/// Opens its session lazily on first use and keeps it until [`close`] or a
/// transport fault. Each send creates a producer, sends once and disposes the
/// producer.
///
/// [`close`]: OneWayClient::close
pub struct OneWayClient {
    manager: Arc<ConnectionManager>,
    destination: Option<Destination>,
    pub(crate) session: Mutex<Option<ClientSession>>,
    closed: AtomicBool,
}

impl OneWayClient {
    /// Client sending to `destination` by default
    pub fn new(manager: Arc<ConnectionManager>, destination: Destination) -> Self {
        Self::build(manager, Some(destination))
    }

    /// Client without a default destination; only [`send_to`] is usable
    ///
    /// [`send_to`]: OneWayClient::send_to
    pub fn unbound(manager: Arc<ConnectionManager>) -> Self {
        Self::build(manager, None)
    }

    fn build(manager: Arc<ConnectionManager>, destination: Option<Destination>) -> Self {
        Self {
            manager,
            destination,
            session: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send to the default destination and return without waiting
    pub async fn send_one_way(&self, message: &TextMessage) -> Result<()> {
        let destination = self.destination.as_ref().ok_or(GatewayError::NoDestination)?;
        self.send_to(destination, message).await
    }

    /// Send to an explicit destination
    pub async fn send_to(&self, destination: &Destination, message: &TextMessage) -> Result<()> {
        self.ensure_open()?;
        let mut recovery = self.manager.recovery();
        let mut slot = self.session.lock().await;

        loop {
            let generation = self.ensure_session(&mut slot, &mut recovery).await?;
            let Some(current) = slot.as_ref() else {
                continue;
            };
            let sent = produce(current.session.as_ref(), destination, message).await;
            match sent {
                Ok(()) => {
                    debug!("Sent {} to {}", message, destination);
                    return Ok(());
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

    /// Release the session; later sends fail with [`GatewayError::Closed`]
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        discard(self.session.lock().await.take()).await;
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(GatewayError::Closed);
        }
        Ok(())
    }

    /// Make sure `slot` holds a session, returning its generation
    pub(crate) async fn ensure_session(
        &self,
        slot: &mut Option<ClientSession>,
        recovery: &mut Recovery<'_>,
    ) -> Result<u64> {
        loop {
            if let Some(current) = slot.as_ref() {
                return Ok(current.generation);
            }

            let handle = self.manager.open().await?;
            match handle
                .connection()
                .create_session(AcknowledgementMode::Auto)
                .await
            {
                Ok(session) => {
                    *slot = Some(ClientSession {
                        generation: handle.generation(),
                        session,
                    });
                }
                Err(fault) => {
                    recovery.recover(handle.generation(), fault).await?;
                }
            }
        }
    }
}

/// Create a producer, send once, dispose the producer
pub(crate) async fn produce(
    session: &dyn BrokerSession,
    destination: &Destination,
    message: &TextMessage,
) -> BrokerResult<()> {
    let producer = session.create_producer(destination).await?;
    let sent = producer.send(message).await;
    close_producer(producer.as_ref()).await;
    sent
}

pub(crate) async fn discard(session: Option<ClientSession>) {
    if let Some(current) = session {
        close_session(current.session.as_ref()).await;
    }
}

#[async_trait]
impl Publisher for OneWayClient {
    async fn publish(&self, message: &TextMessage) -> Result<()> {
        self.send_one_way(message).await
    }

    async fn publish_to(&self, destination: &Destination, message: &TextMessage) -> Result<()> {
        self.send_to(destination, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_broker_sim::SimConnectionFactory;
    use courier_core::FailoverSettings;
    use std::time::Duration;

    const HOST: &str = "tcp://localhost:61616";

    fn setup(failover: FailoverSettings) -> (Arc<SimConnectionFactory>, OneWayClient) {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let manager = Arc::new(ConnectionManager::new(HOST, factory.clone()).with_failover(failover));
        let client = OneWayClient::new(manager, Destination::queue(format!("{HOST}/Orders")));
        (factory, client)
    }

    #[tokio::test]
    async fn test_session_reused_across_sends() {
        let (factory, client) = setup(FailoverSettings::new());

        client.send_one_way(&TextMessage::new("one")).await.unwrap();
        client.send_one_way(&TextMessage::new("two")).await.unwrap();

        let sessions = factory.registry().sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].sent().len(), 2);
        assert_eq!(factory.registry().producers().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_client_rejects_sends() {
        let (factory, client) = setup(FailoverSettings::new());
        client.send_one_way(&TextMessage::new("one")).await.unwrap();
        client.close().await;
        client.close().await;

        let err = client.send_one_way(&TextMessage::new("two")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Closed));
        assert_eq!(factory.registry().sessions()[0].dispose_count(), 1);
    }

    #[tokio::test]
    async fn test_unbound_client_requires_destination() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let manager = Arc::new(ConnectionManager::new(HOST, factory));
        let client = OneWayClient::unbound(manager);

        let err = client.send_one_way(&TextMessage::new("x")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoDestination));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_recovers_after_connection_loss() {
        let failover = FailoverSettings::new()
            .with_broker_uri("tcp://backup:61616")
            .with_initial_reconnect_delay(Duration::from_millis(10))
            .with_max_reconnect_attempts(2);
        let (factory, client) = setup(failover);

        client.send_one_way(&TextMessage::new("before")).await.unwrap();
        factory.sever_all();
        client.send_one_way(&TextMessage::new("after")).await.unwrap();

        let queue = Destination::queue(format!("{HOST}/Orders"));
        assert_eq!(factory.broker().queue_depth(&queue), 2);
        assert_eq!(client.manager().registry().uris()[1], "tcp://backup:61616");
    }
}
