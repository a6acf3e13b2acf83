use chrono::Utc;
use courier_core::{Destination, ServiceHostAdvisory, TextMessage};
use courier_ports::{BrokerFault, BrokerResult, BrokerSession, Delivery, MessageConsumer};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use super::handler::{Disposition, MessageHandler};
use super::options::ListenerOptions;
use super::redelivery::{self, RedeliveryTracker};
use crate::client::{OneWayClient, produce};
use crate::connection::{ConnectionHandle, ConnectionManager};
use crate::dispose::{close_consumer, close_session};
use crate::error::{GatewayError, Result};

/// Counters for one listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub dead_lettered: u64,
    /// Poison messages dropped because no dead-letter queue is configured
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    dead_lettered: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            received: self.received.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            rolled_back: self.rolled_back.load(Ordering::SeqCst),
            dead_lettered: self.dead_lettered.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
        }
    }
}

/// Session and consumer owned by the receive task
struct Subscription {
    generation: u64,
    session: Box<dyn BrokerSession>,
    consumer: Box<dyn MessageConsumer>,
}

enum LoopExit {
    Shutdown,
    Resubscribe,
    Fault(BrokerFault),
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct ListenerInner {
    destination: Destination,
    options: ListenerOptions,
    manager: Arc<ConnectionManager>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    redelivery: Mutex<RedeliveryTracker>,
    counters: Counters,
    resubscribe: Notify,
    running: AtomicBool,
    /// Set until `start()` and again by `stop()`; a held loop is never restarted
    held: AtomicBool,
    disposed: AtomicBool,
    last_error: Mutex<Option<String>>,
    advisory: OneWayClient,
}

/// Long-running transactional consumer
///
/// Each received message is handed to every subscriber in registration order
/// on the listener's receive task, then committed if all of them return
/// [`Disposition::Commit`] and rolled back otherwise. Once a message has been
/// rolled back more than `max_redelivery_count` times it is forwarded to the
/// dead-letter queue and committed.
///
/// Transport faults in the receive loop release the consumer and session,
/// recover the connection through the [`ConnectionManager`] and subscribe
/// again.
pub struct GatewayListener {
    inner: Arc<ListenerInner>,
    control: tokio::sync::Mutex<Option<Running>>,
}

impl GatewayListener {
    pub fn new(
        destination: Destination,
        manager: Arc<ConnectionManager>,
        options: ListenerOptions,
    ) -> Self {
        let advisory = OneWayClient::unbound(Arc::clone(&manager));
        Self {
            inner: Arc::new(ListenerInner {
                destination,
                options,
                manager,
                handlers: RwLock::new(Vec::new()),
                redelivery: Mutex::new(RedeliveryTracker::new()),
                counters: Counters::default(),
                resubscribe: Notify::new(),
                running: AtomicBool::new(false),
                held: AtomicBool::new(true),
                disposed: AtomicBool::new(false),
                last_error: Mutex::new(None),
                advisory,
            }),
            control: tokio::sync::Mutex::new(None),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.inner.destination
    }

    pub fn options(&self) -> &ListenerOptions {
        &self.inner.options
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.inner.manager
    }

    /// Append a subscriber; it sees every message received from now on
    pub fn subscribe(&self, handler: Arc<dyn MessageHandler>) {
        self.inner.handlers.write().push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ListenerStats {
        self.inner.counters.snapshot()
    }

    /// Error that stopped the receive loop, if any
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// Subscribe and spawn the receive loop
    ///
    /// Returns once the consumer is attached, so messages published afterwards
    /// reach this listener. Starting a running listener does nothing.
    pub async fn start(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(GatewayError::Closed);
        }

        let mut control = self.control.lock().await;
        if let Some(running) = control.as_ref() {
            if !running.task.is_finished() {
                return Ok(());
            }
        }
        if let Some(finished) = control.take() {
            let _ = finished.task.await;
        }

        let subscription = self.inner.attach().await?;
        *self.inner.last_error.lock() = None;
        self.inner.held.store(false, Ordering::SeqCst);
        self.inner.running.store(true, Ordering::SeqCst);

        let (shutdown, rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run(subscription, rx).await });
        *control = Some(Running { shutdown, task });

        info!("Listening on {}", self.inner.destination);
        Ok(())
    }

    /// Stop the receive loop and wait for it to release its resources
    ///
    /// A stopped listener stays stopped until the next [`start`].
    ///
    /// [`start`]: GatewayListener::start
    pub async fn stop(&self) {
        self.inner.held.store(true, Ordering::SeqCst);
        let running = self.control.lock().await.take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            warn!(
                "Receive task for {} ended abnormally: {}",
                self.inner.destination, e
            );
        }
        info!("Stopped listening on {}", self.inner.destination);
    }

    /// Prove the connection works by publishing a keep-alive advisory
    ///
    /// Restarts a receive loop that ended on an error; a listener that was
    /// never started or was stopped is left alone. On failure the listener
    /// is told to subscribe again and the error is returned.
    pub async fn assert_connected(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(GatewayError::Closed);
        }
        if !self.is_running() && !self.inner.held.load(Ordering::SeqCst) {
            info!(
                "Listener on {} is not running, restarting",
                self.inner.destination
            );
            if let Err(e) = self.start().await {
                warn!("Restart of listener on {} failed: {}", self.inner.destination, e);
                return Err(e);
            }
        }

        let advisory = ServiceHostAdvisory::new(
            self.inner.destination.uri(),
            process_name(),
            std::process::id(),
            Utc::now(),
        );
        let message = TextMessage::new(serde_json::to_string(&advisory)?).with_persist(false);
        let topic = ServiceHostAdvisory::topic(&self.inner.broker_host());

        match self.inner.advisory.send_to(&topic, &message).await {
            Ok(()) => {
                debug!("Connection check for {} passed", self.inner.destination);
                Ok(())
            }
            Err(e) => {
                warn!("Connection check for {} failed: {}", self.inner.destination, e);
                self.inner.resubscribe.notify_one();
                Err(e)
            }
        }
    }

    /// Stop and release everything; only the first call has an effect
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop().await;
        self.inner.advisory.close().await;
        debug!("Disposed listener on {}", self.inner.destination);
    }
}

impl ListenerInner {
    async fn run(self: Arc<Self>, initial: Subscription, mut shutdown: watch::Receiver<bool>) {
        let mut next = Some(initial);

        loop {
            let subscription = match next.take() {
                Some(subscription) => subscription,
                None => {
                    let attached = tokio::select! {
                        attached = self.attach() => attached,
                        _ = shutdown.changed() => break,
                    };
                    match attached {
                        Ok(subscription) => subscription,
                        Err(e) => {
                            self.record_error(&e);
                            break;
                        }
                    }
                }
            };

            let generation = subscription.generation;
            let exit = self.consume(&subscription, &mut shutdown).await;
            self.release(subscription).await;

            match exit {
                LoopExit::Shutdown => break,
                LoopExit::Resubscribe => {
                    info!("Re-subscribing to {}", self.destination);
                }
                LoopExit::Fault(fault) if fault.is_transport() => {
                    warn!("Transport fault on {}: {}", self.destination, fault);
                    if let Err(e) = self.manager.report_fault(generation, fault).await {
                        self.record_error(&GatewayError::from(e));
                        break;
                    }
                }
                LoopExit::Fault(fault) => {
                    self.record_error(&GatewayError::Broker(fault));
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    async fn consume(
        &self,
        subscription: &Subscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> LoopExit {
        loop {
            if *shutdown.borrow_and_update() {
                return LoopExit::Shutdown;
            }

            tokio::select! {
                _ = shutdown.changed() => return LoopExit::Shutdown,
                _ = self.resubscribe.notified() => return LoopExit::Resubscribe,
                received = subscription.consumer.receive(self.options.receive_timeout) => {
                    match received {
                        Ok(Some(delivery)) => {
                            if let Err(fault) = self.process(subscription, delivery).await {
                                return LoopExit::Fault(fault);
                            }
                        }
                        Ok(None) => {}
                        Err(fault) => return LoopExit::Fault(fault),
                    }
                }
            }
        }
    }

    async fn process(&self, subscription: &Subscription, delivery: Delivery) -> BrokerResult<()> {
        self.counters.received.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Received {} on {} (correlation_id={:?}, reply_to={:?}, delivery_count={})",
            delivery.message_id,
            self.destination,
            delivery.message.correlation_id,
            delivery.message.reply_to.as_ref().map(Destination::uri),
            delivery.delivery_count
        );

        let disposition = self.dispatch(&delivery).await;
        let session = subscription.session.as_ref();

        if !session.is_transacted() {
            if disposition == Disposition::Rollback {
                warn!(
                    "Rollback of {} ignored: listener on {} acknowledges automatically",
                    delivery.message_id, self.destination
                );
            }
            return Ok(());
        }

        match disposition {
            Disposition::Commit => {
                session.commit().await?;
                self.redelivery.lock().clear(&delivery.message_id);
                self.counters.committed.fetch_add(1, Ordering::SeqCst);
            }
            Disposition::Rollback => {
                let attempt = self.redelivery.lock().record_rollback(&delivery.message_id);
                if redelivery::exceeds(attempt, self.options.max_redelivery_count) {
                    self.dead_letter(session, &delivery, attempt).await?;
                    session.commit().await?;
                    self.redelivery.lock().clear(&delivery.message_id);
                } else {
                    debug!(
                        "Rolling back {} on {} (attempt {})",
                        delivery.message_id, self.destination, attempt
                    );
                    session.rollback().await?;
                    self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }

    /// Run every subscriber; any rollback or error rolls the message back
    async fn dispatch(&self, delivery: &Delivery) -> Disposition {
        let handlers: Vec<_> = self.handlers.read().clone();
        if handlers.is_empty() {
            debug!(
                "No subscribers on {}, committing {}",
                self.destination, delivery.message_id
            );
            return Disposition::Commit;
        }

        let mut disposition = Disposition::Commit;
        for handler in handlers {
            match handler.on_message(delivery).await {
                Ok(Disposition::Commit) => {}
                Ok(Disposition::Rollback) => disposition = Disposition::Rollback,
                Err(e) => {
                    warn!(
                        "Subscriber on {} failed for {}: {}",
                        self.destination, delivery.message_id, e
                    );
                    disposition = Disposition::Rollback;
                }
            }
        }
        disposition
    }

    async fn dead_letter(
        &self,
        session: &dyn BrokerSession,
        delivery: &Delivery,
        attempt: u32,
    ) -> BrokerResult<()> {
        match self.options.dead_letter_destination(&self.broker_host()) {
            Some(dlq) => {
                warn!(
                    "{} on {} rolled back {} time(s), forwarding to {}",
                    delivery.message_id, self.destination, attempt, dlq
                );
                produce(session, &dlq, &delivery.message).await?;
                self.counters.dead_lettered.fetch_add(1, Ordering::SeqCst);
            }
            None => {
                error!(
                    "Discarding poison message {} from {} after {} attempt(s): {}",
                    delivery.message_id, self.destination, attempt, delivery.message
                );
                self.counters.discarded.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// Open a session and consumer, recovering the connection as needed
    async fn attach(&self) -> Result<Subscription> {
        let mut recovery = self.manager.recovery();
        loop {
            let handle = self.manager.open().await?;
            match self.open_subscription(&handle).await {
                Ok(subscription) => return Ok(subscription),
                Err(fault) => {
                    recovery.recover(handle.generation(), fault).await?;
                }
            }
        }
    }

    async fn open_subscription(&self, handle: &ConnectionHandle) -> BrokerResult<Subscription> {
        let session = handle
            .connection()
            .create_session(self.options.acknowledgement_mode)
            .await?;

        let consumer = match (&self.options.durable_subscriber_id, self.destination.is_topic()) {
            (Some(subscriber_id), true) => {
                session
                    .create_durable_consumer(&self.destination, subscriber_id)
                    .await
            }
            _ => session.create_consumer(&self.destination).await,
        };

        match consumer {
            Ok(consumer) => Ok(Subscription {
                generation: handle.generation(),
                session,
                consumer,
            }),
            Err(fault) => {
                close_session(session.as_ref()).await;
                Err(fault)
            }
        }
    }

    async fn release(&self, subscription: Subscription) {
        close_consumer(subscription.consumer.as_ref()).await;
        close_session(subscription.session.as_ref()).await;
    }

    fn record_error(&self, e: &GatewayError) {
        error!("Listener on {} stopped: {}", self.destination, e);
        *self.last_error.lock() = Some(e.to_string());
    }

    /// Host of the listened destination, falling back to the manager's
    fn broker_host(&self) -> String {
        let uri = self.destination.destination_uri();
        if uri.host().is_empty() {
            self.manager.host()
        } else {
            uri.host().to_string()
        }
    }
}

fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "courier".to_string())
}
