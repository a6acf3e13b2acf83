//! Broker simulator integration tests
//!
//! Drives the simulator purely through the broker SDK ports, the way the
//! gateway does.

use courier_broker_sim::{ConnectFailure, SimConnectionFactory};
use courier_core::{Destination, DestinationKind, TextMessage};
use courier_ports::{AcknowledgementMode, BrokerConnection, ConnectionFactory, FaultKind};
use std::sync::Arc;
use std::time::Duration;

const HOST: &str = "tcp://localhost:61616";

fn orders() -> Destination {
    Destination::queue(format!("{HOST}/Orders"))
}

async fn started(factory: &SimConnectionFactory) -> Arc<dyn BrokerConnection> {
    let connection = factory.create_connection(HOST).await.unwrap();
    connection.start().await.unwrap();
    connection
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn test_transacted_send_is_invisible_until_commit() {
    let _ = env_logger::try_init();
    let factory = SimConnectionFactory::in_memory();
    let connection = started(&factory).await;

    let session = connection
        .create_session(AcknowledgementMode::Transactional)
        .await
        .unwrap();
    let producer = session.create_producer(&orders()).await.unwrap();
    producer.send(&TextMessage::new("order-1")).await.unwrap();

    assert_eq!(factory.broker().queue_depth(&orders()), 0);
    session.commit().await.unwrap();
    assert_eq!(factory.broker().queue_depth(&orders()), 1);

    let stats = factory.registry().sessions();
    assert_eq!(stats[0].commit_count(), 1);
    assert_eq!(stats[0].sent().len(), 1);
}

#[tokio::test]
async fn test_rollback_redelivers_with_incremented_count() {
    let factory = SimConnectionFactory::in_memory();
    factory.broker().publish(&orders(), TextMessage::new("order-1"));
    let connection = started(&factory).await;

    let session = connection
        .create_session(AcknowledgementMode::Transactional)
        .await
        .unwrap();
    let consumer = session.create_consumer(&orders()).await.unwrap();

    let first = consumer.receive(Duration::from_millis(50)).await.unwrap().unwrap();
    assert_eq!(first.delivery_count, 1);
    session.rollback().await.unwrap();

    let second = consumer.receive(Duration::from_millis(50)).await.unwrap().unwrap();
    assert_eq!(second.delivery_count, 2);
    assert!(second.is_redelivered());
    assert_eq!(second.message.text, "order-1");
    session.commit().await.unwrap();

    assert!(consumer.receive(Duration::from_millis(10)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_commit_on_auto_session_is_protocol_fault() {
    let factory = SimConnectionFactory::in_memory();
    let connection = started(&factory).await;
    let session = connection.create_session(AcknowledgementMode::Auto).await.unwrap();

    let fault = session.commit().await.unwrap_err();
    assert_eq!(fault.kind(), FaultKind::Protocol);
}

#[tokio::test]
async fn test_nothing_delivered_before_start() {
    let factory = SimConnectionFactory::in_memory();
    factory.broker().publish(&orders(), TextMessage::new("early"));
    let connection = factory.create_connection(HOST).await.unwrap();
    let session = connection.create_session(AcknowledgementMode::Auto).await.unwrap();
    let consumer = session.create_consumer(&orders()).await.unwrap();

    assert!(consumer.receive(Duration::from_millis(10)).await.unwrap().is_none());
    connection.start().await.unwrap();
    assert!(consumer.receive(Duration::from_millis(10)).await.unwrap().is_some());
}

// ============================================================================
// Topics and temporary destinations
// ============================================================================

#[tokio::test]
async fn test_durable_subscription_buffers_while_detached() {
    let factory = SimConnectionFactory::in_memory();
    let topic = Destination::topic(format!("{HOST}/Prices"));

    let connection = started(&factory).await;
    connection.set_client_id("pricing").await.unwrap();
    let session = connection.create_session(AcknowledgementMode::Auto).await.unwrap();
    let consumer = session.create_durable_consumer(&topic, "sub-1").await.unwrap();
    consumer.close().await.unwrap();

    factory.broker().publish(&topic, TextMessage::new("tick"));

    let consumer = session.create_durable_consumer(&topic, "sub-1").await.unwrap();
    let delivery = consumer.receive(Duration::from_millis(50)).await.unwrap().unwrap();
    assert_eq!(delivery.message.text, "tick");
}

#[tokio::test]
async fn test_durable_subscription_requires_client_id() {
    let factory = SimConnectionFactory::in_memory();
    let connection = started(&factory).await;
    let session = connection.create_session(AcknowledgementMode::Auto).await.unwrap();

    let topic = Destination::topic(format!("{HOST}/Prices"));
    let fault = session.create_durable_consumer(&topic, "sub-1").await.err().unwrap();
    assert_eq!(fault.kind(), FaultKind::Protocol);
}

#[tokio::test]
async fn test_temporary_queues_removed_with_connection() {
    let factory = SimConnectionFactory::in_memory();
    let connection = started(&factory).await;
    let session = connection.create_session(AcknowledgementMode::Auto).await.unwrap();

    let temp = session
        .create_temporary_destination(DestinationKind::Queue)
        .await
        .unwrap();
    assert!(temp.is_temporary());
    assert_eq!(factory.broker().temporary_queue_count(), 1);

    connection.close().await.unwrap();
    assert_eq!(factory.broker().temporary_queue_count(), 0);
}

// ============================================================================
// Disposal accounting
// ============================================================================

#[tokio::test]
async fn test_connection_close_cascades_once() {
    let factory = SimConnectionFactory::in_memory();
    let connection = started(&factory).await;
    let session = connection
        .create_session(AcknowledgementMode::Transactional)
        .await
        .unwrap();
    let producer = session.create_producer(&orders()).await.unwrap();
    let _consumer = session.create_consumer(&orders()).await.unwrap();

    producer.close().await.unwrap();
    connection.close().await.unwrap();

    assert!(factory.registry().disposal_violations().is_empty());
    assert_eq!(factory.registry().resources().len(), 4);
}

#[tokio::test]
async fn test_double_close_is_counted() {
    let factory = SimConnectionFactory::in_memory();
    let connection = started(&factory).await;
    let session = connection.create_session(AcknowledgementMode::Auto).await.unwrap();

    session.close().await.unwrap();
    session.close().await.unwrap();
    connection.close().await.unwrap();

    let violations = factory.registry().disposal_violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].dispose_count(), 2);
}

// ============================================================================
// Fault injection
// ============================================================================

#[tokio::test]
async fn test_refused_attempts_are_recorded() {
    let factory = SimConnectionFactory::in_memory().with_failure(ConnectFailure::FirstAttempts(2));

    assert!(factory.create_connection(HOST).await.is_err());
    assert!(factory.create_connection("tcp://backup:61616").await.is_err());
    assert!(factory.create_connection(HOST).await.is_ok());

    assert_eq!(
        factory.registry().connection_attempts(),
        vec![HOST, "tcp://backup:61616", HOST]
    );
    assert_eq!(factory.registry().connections().len(), 1);
}

#[tokio::test]
async fn test_failing_uri_only() {
    let factory = SimConnectionFactory::in_memory()
        .with_failure(ConnectFailure::Uris(vec![HOST.to_string()]));

    let fault = factory.create_connection(HOST).await.err().unwrap();
    assert!(fault.is_transport());
    assert!(factory.create_connection("tcp://backup:61616").await.is_ok());
}

#[tokio::test]
async fn test_sever_returns_uncommitted_receives() {
    let factory = SimConnectionFactory::in_memory();
    factory.broker().publish(&orders(), TextMessage::new("order-1"));
    let connection = started(&factory).await;
    let session = connection
        .create_session(AcknowledgementMode::Transactional)
        .await
        .unwrap();
    let consumer = session.create_consumer(&orders()).await.unwrap();
    consumer.receive(Duration::from_millis(50)).await.unwrap().unwrap();

    factory.sever_all();

    let fault = consumer.receive(Duration::from_millis(10)).await.unwrap_err();
    assert!(fault.is_transport());
    assert!(session.commit().await.unwrap_err().is_transport());
    assert_eq!(factory.broker().queue_depth(&orders()), 1);
    assert!(factory.live_connections().is_empty());
}

#[tokio::test]
async fn test_sever_wakes_blocked_receive() {
    let factory = Arc::new(SimConnectionFactory::in_memory());
    let connection = started(&factory).await;
    let session = connection.create_session(AcknowledgementMode::Auto).await.unwrap();
    let consumer = session.create_consumer(&orders()).await.unwrap();

    let severing = Arc::clone(&factory);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        severing.sever_all();
    });

    let fault = consumer.receive(Duration::from_secs(5)).await.unwrap_err();
    assert!(fault.is_transport());
}
