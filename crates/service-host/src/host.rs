use async_trait::async_trait;
use courier_core::TextMessage;
use courier_gateway::{
    Disposition, GatewayError, GatewayListener, HandlerError, MessageHandler, OneWayClient,
    Publisher,
};
use courier_ports::{Delivery, MessageSerializer};
use log::{debug, error, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::ServiceError;
use crate::service::RequestHandler;

/// Counters for one service host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub requests: u64,
    pub replies: u64,
    /// Replies carrying a fault instead of a response
    pub faults: u64,
    /// Requests rolled back because the reply could not be published
    pub failed_replies: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    replies: AtomicU64,
    faults: AtomicU64,
    failed_replies: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> HostStats {
        HostStats {
            requests: self.requests.load(Ordering::SeqCst),
            replies: self.replies.load(Ordering::SeqCst),
            faults: self.faults.load(Ordering::SeqCst),
            failed_replies: self.failed_replies.load(Ordering::SeqCst),
        }
    }
}

/// Listener subscriber that runs the request handler and answers `reply_to`
struct RequestDispatcher {
    handler: Arc<dyn RequestHandler>,
    serializer: Arc<dyn MessageSerializer>,
    publisher: Arc<dyn Publisher>,
    counters: Arc<Counters>,
}

impl RequestDispatcher {
    async fn invoke(&self, request: &TextMessage) -> Result<String, ServiceError> {
        let value = self
            .serializer
            .deserialize(&request.text)
            .map_err(ServiceError::from_error)?;
        let response = self.handler.handle(value).await?;
        self.serializer
            .serialize(&response)
            .map_err(ServiceError::from_error)
    }

    fn fault_body(&self, err: &ServiceError) -> Result<String, HandlerError> {
        let fault = serde_json::to_value(err.to_fault())
            .map_err(|e| HandlerError::new(format!("fault encoding failed: {e}")))?;
        self.serializer
            .serialize(&fault)
            .map_err(|e| HandlerError::new(format!("fault encoding failed: {e}")))
    }
}

#[async_trait]
impl MessageHandler for RequestDispatcher {
    async fn on_message(&self, delivery: &Delivery) -> Result<Disposition, HandlerError> {
        let request = &delivery.message;
        self.counters.requests.fetch_add(1, Ordering::SeqCst);
        let outcome = self.invoke(request).await;

        let Some(reply_to) = request.reply_to.as_ref() else {
            if let Err(err) = &outcome {
                warn!(
                    "One-way request {:?} failed: {}",
                    request.correlation_id, err
                );
            }
            return Ok(Disposition::Commit);
        };

        let body = match outcome {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    "Request {:?} failed, replying with fault: {}",
                    request.correlation_id, err
                );
                self.counters.faults.fetch_add(1, Ordering::SeqCst);
                self.fault_body(&err)?
            }
        };

        let reply = request.reply(body);
        match self.publisher.publish_to(reply_to, &reply).await {
            Ok(()) => {
                debug!("Replied to {:?} on {}", request.correlation_id, reply_to);
                self.counters.replies.fetch_add(1, Ordering::SeqCst);
                Ok(Disposition::Commit)
            }
            Err(e) => {
                error!(
                    "Reply to {:?} on {} failed: {}",
                    request.correlation_id, reply_to, e
                );
                self.counters.failed_replies.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::new(format!("reply failed: {e}")))
            }
        }
    }
}

/// A request handler bound to a gateway listener
///
/// Requests are decoded with the serializer and handed to the handler. The
/// response, or a [`Fault`](courier_core::Fault) when the handler fails, is
/// sent to the request's `reply_to` with its correlation id. Requests without
/// `reply_to` get no reply. Failing to deliver the reply rolls the request
/// back so the broker redelivers it.
pub struct ServiceHost {
    listener: Arc<GatewayListener>,
    /// Reply client created by the host itself, closed on dispose
    owned_client: Option<Arc<OneWayClient>>,
    counters: Arc<Counters>,
    disposed: AtomicBool,
}

impl ServiceHost {
    /// Host replying through its own client on the listener's connection
    pub fn new(
        listener: Arc<GatewayListener>,
        handler: Arc<dyn RequestHandler>,
        serializer: Arc<dyn MessageSerializer>,
    ) -> Self {
        let client = Arc::new(OneWayClient::unbound(Arc::clone(listener.manager())));
        let publisher: Arc<dyn Publisher> = client.clone();
        Self::build(listener, handler, serializer, publisher, Some(client))
    }

    /// Host replying through a caller supplied publisher
    pub fn with_reply_publisher(
        listener: Arc<GatewayListener>,
        handler: Arc<dyn RequestHandler>,
        serializer: Arc<dyn MessageSerializer>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self::build(listener, handler, serializer, publisher, None)
    }

    fn build(
        listener: Arc<GatewayListener>,
        handler: Arc<dyn RequestHandler>,
        serializer: Arc<dyn MessageSerializer>,
        publisher: Arc<dyn Publisher>,
        owned_client: Option<Arc<OneWayClient>>,
    ) -> Self {
        let counters = Arc::new(Counters::default());
        listener.subscribe(Arc::new(RequestDispatcher {
            handler,
            serializer,
            publisher,
            counters: Arc::clone(&counters),
        }));
        Self {
            listener,
            owned_client,
            counters,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn listener(&self) -> &Arc<GatewayListener> {
        &self.listener
    }

    pub fn stats(&self) -> HostStats {
        self.counters.snapshot()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub async fn start(&self) -> Result<(), GatewayError> {
        self.listener.start().await
    }

    pub async fn stop(&self) {
        self.listener.stop().await
    }

    pub async fn assert_connected(&self) -> Result<(), GatewayError> {
        self.listener.assert_connected().await
    }

    /// Dispose the listener and the host's reply client; only the first call
    /// has an effect
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.listener.dispose().await;
        if let Some(client) = &self.owned_client {
            client.close().await;
        }
        debug!("Disposed service host on {}", self.listener.destination());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;
    use courier_broker_sim::SimConnectionFactory;
    use courier_core::{Destination, DestinationKind};
    use courier_gateway::{ConnectionManager, ListenerOptions};
    use courier_ports::ConnectionFactory;
    use serde_json::{Value, json};

    const HOST: &str = "tcp://localhost:61616";

    struct Upper;

    #[async_trait]
    impl RequestHandler for Upper {
        async fn handle(&self, request: Value) -> Result<Value, ServiceError> {
            match request.as_str() {
                Some(text) => Ok(Value::String(text.to_uppercase())),
                None => Err(ServiceError::new("Upper::NotText", "expected a string")),
            }
        }
    }

    /// Publisher that always fails
    struct Unreachable;

    #[async_trait]
    impl Publisher for Unreachable {
        async fn publish(&self, _message: &TextMessage) -> Result<(), GatewayError> {
            Err(GatewayError::NoDestination)
        }

        async fn publish_to(
            &self,
            _destination: &Destination,
            _message: &TextMessage,
        ) -> Result<(), GatewayError> {
            Err(GatewayError::Closed)
        }
    }

    fn delivery(message: TextMessage) -> Delivery {
        Delivery {
            message_id: "ID:test-1".to_string(),
            destination: Destination::queue(format!("{HOST}/Upper")),
            delivery_count: 1,
            message,
        }
    }

    fn dispatcher(
        factory: &Arc<SimConnectionFactory>,
        publisher: Option<Arc<dyn Publisher>>,
    ) -> RequestDispatcher {
        let manager = Arc::new(ConnectionManager::new(
            HOST,
            Arc::clone(factory) as Arc<dyn ConnectionFactory>,
        ));
        let publisher =
            publisher.unwrap_or_else(|| Arc::new(OneWayClient::unbound(manager)) as Arc<dyn Publisher>);
        RequestDispatcher {
            handler: Arc::new(Upper),
            serializer: Arc::new(JsonSerializer),
            publisher,
            counters: Arc::new(Counters::default()),
        }
    }

    fn reply_queue() -> Destination {
        Destination::temporary(DestinationKind::Queue, format!("{HOST}/temp-reply"))
    }

    #[tokio::test]
    async fn test_reply_carries_correlation_and_session() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let dispatcher = dispatcher(&factory, None);
        let request = TextMessage::new("\"abc\"")
            .with_correlation_id("c-1")
            .with_session_id("s-1")
            .with_reply_to(reply_queue());

        let disposition = dispatcher.on_message(&delivery(request)).await.unwrap();
        assert_eq!(disposition, Disposition::Commit);

        let replies = factory.broker().queued(&reply_queue());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, "\"ABC\"");
        assert_eq!(replies[0].correlation_id.as_deref(), Some("c-1"));
        assert_eq!(replies[0].session_id.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_fault_reply() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let dispatcher = dispatcher(&factory, None);
        let request = TextMessage::new("42").with_reply_to(reply_queue());

        let disposition = dispatcher.on_message(&delivery(request)).await.unwrap();
        assert_eq!(disposition, Disposition::Commit);

        let body: Value = serde_json::from_str(&factory.broker().queued(&reply_queue())[0].text).unwrap();
        assert_eq!(body["faultCode"], json!("Upper::NotText"));
        assert_eq!(body["faultMessage"], json!("expected a string"));
        assert_eq!(dispatcher.counters.snapshot().faults, 1);
    }

    #[tokio::test]
    async fn test_malformed_request_becomes_fault_reply() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let dispatcher = dispatcher(&factory, None);
        let request = TextMessage::new("{oops").with_reply_to(reply_queue());

        dispatcher.on_message(&delivery(request)).await.unwrap();

        let body: Value = serde_json::from_str(&factory.broker().queued(&reply_queue())[0].text).unwrap();
        assert!(body["faultCode"].as_str().unwrap().contains("SerializationError"));
    }

    #[tokio::test]
    async fn test_one_way_request_commits_without_reply() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let dispatcher = dispatcher(&factory, None);

        let disposition = dispatcher
            .on_message(&delivery(TextMessage::new("\"abc\"")))
            .await
            .unwrap();

        assert_eq!(disposition, Disposition::Commit);
        assert!(factory.registry().producers().is_empty());
        assert_eq!(dispatcher.counters.snapshot().replies, 0);
    }

    #[tokio::test]
    async fn test_failed_reply_rolls_back() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let dispatcher = dispatcher(&factory, Some(Arc::new(Unreachable)));
        let request = TextMessage::new("\"abc\"").with_reply_to(reply_queue());

        assert!(dispatcher.on_message(&delivery(request)).await.is_err());
        assert_eq!(dispatcher.counters.snapshot().failed_replies, 1);
    }

    #[tokio::test]
    async fn test_dispose_closes_owned_client_once() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let manager = Arc::new(ConnectionManager::new(HOST, factory.clone()));
        let listener = Arc::new(GatewayListener::new(
            Destination::queue(format!("{HOST}/Upper")),
            manager,
            ListenerOptions::new(),
        ));
        let host = ServiceHost::new(listener.clone(), Arc::new(Upper), Arc::new(JsonSerializer));
        assert_eq!(listener.handler_count(), 1);

        host.start().await.unwrap();
        host.dispose().await;
        host.dispose().await;

        assert!(host.is_disposed());
        assert!(listener.is_disposed());
        for session in factory.registry().sessions() {
            assert_eq!(session.dispose_count(), 1);
        }
    }
}
