use async_trait::async_trait;
use courier_ports::{BrokerConnection, BrokerFault, BrokerResult, ConnectionFactory};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::connection::SimConnection;
use crate::application::InMemoryBroker;
use crate::registry::SimRegistry;

/// Which connection attempts the factory refuses
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectFailure {
    #[default]
    Never,
    /// Every attempt fails with a transport fault
    Always,
    /// The first `n` attempts fail, later ones succeed
    FirstAttempts(u32),
    /// Attempts against any of these URIs fail
    Uris(Vec<String>),
}

impl ConnectFailure {
    fn refuses(&self, attempt: u32, uri: &str) -> bool {
        match self {
            ConnectFailure::Never => false,
            ConnectFailure::Always => true,
            ConnectFailure::FirstAttempts(n) => attempt <= *n,
            ConnectFailure::Uris(uris) => uris.iter().any(|u| u == uri),
        }
    }
}

/// Connection factory over a shared [`InMemoryBroker`]
pub struct SimConnectionFactory {
    broker: Arc<InMemoryBroker>,
    registry: SimRegistry,
    failure: Mutex<ConnectFailure>,
    attempts: AtomicU32,
    next_connection_id: AtomicU64,
    live: Mutex<Vec<Arc<SimConnection>>>,
}

impl SimConnectionFactory {
    pub fn new(broker: Arc<InMemoryBroker>, registry: SimRegistry) -> Self {
        Self {
            broker,
            registry,
            failure: Mutex::new(ConnectFailure::Never),
            attempts: AtomicU32::new(0),
            next_connection_id: AtomicU64::new(0),
            live: Mutex::new(Vec::new()),
        }
    }

    /// Factory with its own broker and registry
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBroker::new()), SimRegistry::new())
    }

    pub fn with_failure(self, failure: ConnectFailure) -> Self {
        *self.failure.lock() = failure;
        self
    }

    /// Change the failure plan for subsequent attempts
    pub fn set_failure(&self, failure: ConnectFailure) {
        *self.failure.lock() = failure;
    }

    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }

    pub fn registry(&self) -> &SimRegistry {
        &self.registry
    }

    /// Connections that are neither closed nor severed
    pub fn live_connections(&self) -> Vec<Arc<SimConnection>> {
        self.live
            .lock()
            .iter()
            .filter(|c| !c.is_closed() && !c.is_severed())
            .cloned()
            .collect()
    }

    /// Simulate a network outage on every open connection
    pub fn sever_all(&self) {
        let live = self.live_connections();
        warn!("Severing {} simulated connection(s)", live.len());
        for connection in live {
            connection.sever();
        }
    }
}

#[async_trait]
impl ConnectionFactory for SimConnectionFactory {
    async fn create_connection(&self, uri: &str) -> BrokerResult<Arc<dyn BrokerConnection>> {
        self.registry.record_attempt(uri);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if self.failure.lock().refuses(attempt, uri) {
            debug!("Refusing simulated connection attempt {} to {}", attempt, uri);
            return Err(BrokerFault::transport(format!("connection refused: {uri}")));
        }

        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        let connection = Arc::new(SimConnection::new(
            id,
            uri,
            Arc::clone(&self.broker),
            self.registry.clone(),
        ));
        self.live.lock().push(Arc::clone(&connection));
        debug!("Opened simulated connection {} to {}", id, uri);
        Ok(connection)
    }
}
