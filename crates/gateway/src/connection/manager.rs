use courier_core::{DestinationUri, FailoverSettings};
use courier_ports::{BrokerConnection, BrokerFault, BrokerResult, ConnectionFactory};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::recovery::Recovery;
use super::registry::{AttemptOutcome, ConnectionRegistry};
use crate::dispose::close_connection;
use crate::error::ConnectionError;

/// Lifecycle of the managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt sequence was exhausted; the next open starts over
    Failed,
}

/// A live connection tagged with the generation it was opened in
#[derive(Clone)]
pub struct ConnectionHandle {
    generation: u64,
    connection: Arc<dyn BrokerConnection>,
}

impl ConnectionHandle {
    /// Incremented on every successful (re)connect
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connection(&self) -> &Arc<dyn BrokerConnection> {
        &self.connection
    }

    pub fn uri(&self) -> &str {
        self.connection.uri()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("generation", &self.generation)
            .field("uri", &self.connection.uri())
            .finish()
    }
}

#[derive(Default)]
struct ManagerInner {
    current: Option<ConnectionHandle>,
}

/// Owns the physical broker connection and its failover policy
///
/// Dependents open sessions on the shared connection and report transport
/// faults back through [`ConnectionManager::report_fault`] with the
/// generation they were using. The first report for a generation closes the
/// broken connection and walks the failover list; later reports for the same
/// generation get the replacement without reconnecting again.
pub struct ConnectionManager {
    uri: String,
    failover: FailoverSettings,
    client_id: Option<String>,
    factory: Arc<dyn ConnectionFactory>,
    registry: ConnectionRegistry,
    inner: Mutex<ManagerInner>,
    state: parking_lot::Mutex<ConnectionState>,
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(uri: impl Into<String>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            uri: uri.into(),
            failover: FailoverSettings::default(),
            client_id: None,
            factory,
            registry: ConnectionRegistry::new(),
            inner: Mutex::new(ManagerInner::default()),
            state: parking_lot::Mutex::new(ConnectionState::Disconnected),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_failover(mut self, failover: FailoverSettings) -> Self {
        self.failover = failover;
        self
    }

    /// Client id applied to every new connection (needed for durable subscribers)
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_registry(mut self, registry: ConnectionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Broker endpoint of the initial URI, e.g. `tcp://localhost:61616`
    pub fn host(&self) -> String {
        DestinationUri::parse(&self.uri).host().to_string()
    }

    pub fn failover(&self) -> &FailoverSettings {
        &self.failover
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Recovery budget for one operation
    pub fn recovery(&self) -> Recovery<'_> {
        Recovery::new(self)
    }

    /// Current connection, connecting first if there is none
    pub async fn open(&self) -> Result<ConnectionHandle, ConnectionError> {
        let mut inner = self.inner.lock().await;
        if let Some(current) = &inner.current {
            return Ok(current.clone());
        }
        self.connect_from_start(&mut inner).await
    }

    /// A fresh attempt sequence: the configured URI, then the failover list
    async fn connect_from_start(
        &self,
        inner: &mut ManagerInner,
    ) -> Result<ConnectionHandle, ConnectionError> {
        self.set_state(ConnectionState::Connecting);
        match self.connect(&self.uri, 0).await {
            Ok(connection) => Ok(self.install(inner, connection)),
            Err(fault) if fault.is_transport() => {
                warn!("Initial connection to {} failed: {}", self.uri, fault);
                self.reconnect(inner, fault, 1).await
            }
            Err(fault) => {
                self.set_state(ConnectionState::Failed);
                Err(ConnectionError::Rejected {
                    uri: self.uri.clone(),
                    source: fault,
                })
            }
        }
    }

    /// Report a transport fault seen while using connection `generation`
    pub async fn report_fault(
        &self,
        generation: u64,
        fault: BrokerFault,
    ) -> Result<ConnectionHandle, ConnectionError> {
        let mut inner = self.inner.lock().await;
        let Some(current) = &inner.current else {
            // Already failed or closed: the fault belongs to a finished sequence
            debug!(
                "Fault from generation {} with no live connection, starting over: {}",
                generation, fault
            );
            return self.connect_from_start(&mut inner).await;
        };
        if current.generation != generation {
            debug!(
                "Ignoring fault from stale generation {} (current {}): {}",
                generation, current.generation, fault
            );
            return Ok(current.clone());
        }

        if let Some(broken) = inner.current.take() {
            warn!("Connection to {} lost: {}", broken.uri(), fault);
            close_connection(broken.connection.as_ref()).await;
        }
        self.set_state(ConnectionState::Connecting);
        self.reconnect(&mut inner, fault, 0).await
    }

    /// Close the connection; the next open reconnects from the initial URI
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(current) = inner.current.take() {
            debug!("Closing connection to {}", current.uri());
            close_connection(current.connection.as_ref()).await;
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn reconnect(
        &self,
        inner: &mut ManagerInner,
        original: BrokerFault,
        attempts_made: u32,
    ) -> Result<ConnectionHandle, ConnectionError> {
        let budget = self.failover.retry_budget();

        for retry in 1..=budget {
            let Some(uri) = self.failover.broker_uri_for_attempt(retry) else {
                break;
            };
            let delay = self.failover.reconnect_delay(retry);
            warn!(
                "Reconnecting to {} in {:?} (attempt {}/{})",
                uri, delay, retry, budget
            );
            tokio::time::sleep(delay).await;

            match self.connect(uri, retry).await {
                Ok(connection) => {
                    info!("Reconnected to {} on attempt {}", uri, retry);
                    return Ok(self.install(inner, connection));
                }
                Err(fault) => warn!("Reconnect attempt {} to {} failed: {}", retry, uri, fault),
            }
        }

        self.set_state(ConnectionState::Failed);
        error!(
            "Giving up on {} after {} reconnect attempt(s): {}",
            self.uri, budget, original
        );
        Err(ConnectionError::Exhausted {
            uri: self.uri.clone(),
            attempts: attempts_made + budget,
            source: original,
        })
    }

    /// One recorded attempt: create, apply client id, start
    async fn connect(&self, uri: &str, retry: u32) -> BrokerResult<Arc<dyn BrokerConnection>> {
        let result = self.prepare(uri).await;
        let outcome = match &result {
            Ok(_) => AttemptOutcome::Connected,
            Err(fault) => AttemptOutcome::Failed(fault.to_string()),
        };
        self.registry.record(uri, retry, outcome);
        result
    }

    async fn prepare(&self, uri: &str) -> BrokerResult<Arc<dyn BrokerConnection>> {
        let connection = self.factory.create_connection(uri).await?;

        let started = async {
            if let Some(client_id) = &self.client_id {
                connection.set_client_id(client_id).await?;
            }
            connection.start().await
        };
        if let Err(fault) = started.await {
            close_connection(connection.as_ref()).await;
            return Err(fault);
        }
        Ok(connection)
    }

    fn install(&self, inner: &mut ManagerInner, connection: Arc<dyn BrokerConnection>) -> ConnectionHandle {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = ConnectionHandle {
            generation,
            connection,
        };
        debug!("Connected to {} (generation {})", handle.uri(), generation);
        inner.current = Some(handle.clone());
        self.set_state(ConnectionState::Connected);
        handle
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_broker_sim::{ConnectFailure, SimConnectionFactory};
    use std::time::Duration;

    const PRIMARY: &str = "tcp://primary:61616";

    fn manager(factory: &Arc<SimConnectionFactory>, failover: FailoverSettings) -> ConnectionManager {
        ConnectionManager::new(PRIMARY, factory.clone()).with_failover(failover)
    }

    fn two_brokers(attempts: u32) -> FailoverSettings {
        FailoverSettings::new()
            .with_broker_uris(["tcp://b1:61616", "tcp://b2:61616"])
            .with_initial_reconnect_delay(Duration::from_millis(10))
            .with_max_reconnect_attempts(attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_makes_budget_plus_one_attempts() {
        let _ = env_logger::try_init();
        let factory = Arc::new(SimConnectionFactory::in_memory().with_failure(ConnectFailure::Always));
        let manager = manager(&factory, two_brokers(5));

        let err = manager.open().await.unwrap_err();

        assert_eq!(
            manager.registry().uris(),
            vec![
                PRIMARY,
                "tcp://b1:61616",
                "tcp://b2:61616",
                "tcp://b1:61616",
                "tcp://b2:61616",
                "tcp://b1:61616",
            ]
        );
        match err {
            ConnectionError::Exhausted { attempts, source, .. } => {
                assert_eq!(attempts, 6);
                assert!(source.is_transport());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(manager.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_no_failover_fails_on_first_attempt() {
        let factory = Arc::new(SimConnectionFactory::in_memory().with_failure(ConnectFailure::Always));
        let manager = manager(&factory, FailoverSettings::new().with_max_reconnect_attempts(5));

        let err = manager.open().await.unwrap_err();
        assert_eq!(manager.registry().len(), 1);
        assert!(matches!(err, ConnectionError::Exhausted { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_escalates_to_cap() {
        let factory = Arc::new(SimConnectionFactory::in_memory().with_failure(ConnectFailure::Always));
        let failover = FailoverSettings::new()
            .with_broker_uri("tcp://b1:61616")
            .with_initial_reconnect_delay(Duration::from_millis(100))
            .with_max_reconnect_delay(Duration::from_millis(250))
            .with_max_reconnect_attempts(3);
        let manager = manager(&factory, failover);

        let started = tokio::time::Instant::now();
        let _ = manager.open().await;

        // 100 + 200 + 250
        assert!(started.elapsed() >= Duration::from_millis(550));
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fault_reuses_replacement() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let manager = manager(&factory, two_brokers(3));

        let first = manager.open().await.unwrap();
        factory.sever_all();

        let fault = BrokerFault::transport("lost");
        let second = manager.report_fault(first.generation(), fault.clone()).await.unwrap();
        assert_eq!(second.generation(), first.generation() + 1);
        assert_eq!(second.uri(), "tcp://b1:61616");

        let again = manager.report_fault(first.generation(), fault).await.unwrap();
        assert_eq!(again.generation(), second.generation());
        assert_eq!(manager.registry().len(), 2);
        assert_eq!(factory.registry().connections()[0].dispose_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_sequence_restarts_on_next_open() {
        let factory = Arc::new(
            SimConnectionFactory::in_memory().with_failure(ConnectFailure::FirstAttempts(2)),
        );
        let manager = manager(&factory, FailoverSettings::new());

        assert!(manager.open().await.is_err());
        assert!(manager.open().await.is_err());
        let handle = manager.open().await.unwrap();

        assert_eq!(handle.uri(), PRIMARY);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.registry().failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_after_close_starts_from_primary() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let manager = manager(&factory, two_brokers(3));

        let first = manager.open().await.unwrap();
        manager.close().await;

        let handle = manager
            .report_fault(first.generation(), BrokerFault::transport("lost"))
            .await
            .unwrap();
        assert_eq!(handle.uri(), PRIMARY);
        assert_eq!(manager.registry().uris(), vec![PRIMARY, PRIMARY]);
    }

    #[tokio::test]
    async fn test_client_id_applied_and_close_disposes_once() {
        let factory = Arc::new(SimConnectionFactory::in_memory());
        let manager = manager(&factory, FailoverSettings::new()).with_client_id("pricing-service");

        manager.open().await.unwrap();
        manager.open().await.unwrap();
        assert_eq!(factory.registry().connections().len(), 1);
        assert_eq!(
            factory.live_connections()[0].client_id().as_deref(),
            Some("pricing-service")
        );

        manager.close().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(factory.registry().disposal_violations().is_empty());
    }
}
