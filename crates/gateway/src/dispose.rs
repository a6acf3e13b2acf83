//! Best-effort release of broker resources
//!
//! Disposal failures are logged and swallowed so they never mask the outcome
//! of the operation that owned the resource.

use courier_core::Destination;
use courier_ports::{BrokerConnection, BrokerSession, MessageConsumer, MessageProducer};
use log::warn;

pub(crate) async fn close_connection(connection: &dyn BrokerConnection) {
    if let Err(fault) = connection.close().await {
        warn!("Failed to close connection to {}: {}", connection.uri(), fault);
    }
}

pub(crate) async fn close_session(session: &dyn BrokerSession) {
    if let Err(fault) = session.close().await {
        warn!("Failed to close session: {}", fault);
    }
}

pub(crate) async fn close_producer(producer: &dyn MessageProducer) {
    if let Err(fault) = producer.close().await {
        warn!("Failed to close producer for {}: {}", producer.destination(), fault);
    }
}

pub(crate) async fn close_consumer(consumer: &dyn MessageConsumer) {
    if let Err(fault) = consumer.close().await {
        warn!("Failed to close consumer for {}: {}", consumer.destination(), fault);
    }
}

pub(crate) async fn delete_temporary(session: &dyn BrokerSession, destination: &Destination) {
    if let Err(fault) = session.delete_temporary_destination(destination).await {
        warn!("Failed to delete temporary destination {}: {}", destination, fault);
    }
}
