use async_trait::async_trait;
use courier_core::Destination;
use courier_ports::{AcknowledgementMode, BrokerConnection, BrokerFault, BrokerResult, BrokerSession};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::session::{SessionShared, SimSession};
use crate::application::InMemoryBroker;
use crate::model::ResourceKind;
use crate::registry::{ResourceStats, SimRegistry};

pub(crate) struct ConnectionShared {
    pub(crate) id: u64,
    pub(crate) uri: String,
    pub(crate) broker: Arc<InMemoryBroker>,
    pub(crate) registry: SimRegistry,
    stats: Arc<ResourceStats>,
    severed: AtomicBool,
    closed: AtomicBool,
    started: AtomicBool,
    client_id: Mutex<Option<String>>,
    sessions: Mutex<Vec<Arc<SessionShared>>>,
    temporaries: Mutex<Vec<Destination>>,
}

impl ConnectionShared {
    /// Transport fault once severed, protocol fault once closed
    pub(crate) fn check_open(&self) -> BrokerResult<()> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(BrokerFault::transport(format!(
                "connection to {} was lost",
                self.uri
            )));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerFault::protocol("connection is closed"));
        }
        Ok(())
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn client_id(&self) -> Option<String> {
        self.client_id.lock().clone()
    }

    pub(crate) fn track_temporary(&self, destination: Destination) {
        self.temporaries.lock().push(destination);
    }

    pub(crate) fn forget_temporary(&self, destination: &Destination) {
        self.temporaries.lock().retain(|d| d != destination);
    }
}

/// Simulated broker connection
///
/// Closing it closes every session still open and deletes its temporary
/// destinations. [`SimConnection::sever`] simulates a network outage: every
/// later operation on the connection or its children fails with a transport
/// fault.
pub struct SimConnection {
    shared: Arc<ConnectionShared>,
}

impl SimConnection {
    pub(crate) fn new(id: u64, uri: &str, broker: Arc<InMemoryBroker>, registry: SimRegistry) -> Self {
        let stats = registry.register(ResourceKind::Connection, uri);
        Self {
            shared: Arc::new(ConnectionShared {
                id,
                uri: uri.to_string(),
                broker,
                registry,
                stats,
                severed: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                started: AtomicBool::new(false),
                client_id: Mutex::new(None),
                sessions: Mutex::new(Vec::new()),
                temporaries: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn stats(&self) -> &Arc<ResourceStats> {
        &self.shared.stats
    }

    pub fn client_id(&self) -> Option<String> {
        self.shared.client_id()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn is_severed(&self) -> bool {
        self.shared.severed.load(Ordering::SeqCst)
    }

    /// Drop the link to the broker; uncommitted receives become redeliverable
    pub fn sever(&self) {
        if self.shared.severed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Simulated connection {} to {} severed", self.shared.id, self.shared.uri);
        for session in self.shared.sessions.lock().iter() {
            session.abandon();
        }
        self.shared.broker.wake_all();
    }
}

#[async_trait]
impl BrokerConnection for SimConnection {
    fn uri(&self) -> &str {
        &self.shared.uri
    }

    async fn set_client_id(&self, client_id: &str) -> BrokerResult<()> {
        self.shared.check_open()?;
        let mut current = self.shared.client_id.lock();
        if self.shared.is_started() && current.as_deref() != Some(client_id) {
            return Err(BrokerFault::protocol(
                "client id cannot change after the connection has started",
            ));
        }
        *current = Some(client_id.to_string());
        Ok(())
    }

    async fn create_session(
        &self,
        mode: AcknowledgementMode,
    ) -> BrokerResult<Box<dyn BrokerSession>> {
        self.shared.check_open()?;
        let session = SimSession::new(Arc::clone(&self.shared), mode);
        self.shared.sessions.lock().push(session.shared());
        Ok(Box::new(session))
    }

    async fn start(&self) -> BrokerResult<()> {
        self.shared.check_open()?;
        self.shared.started.store(true, Ordering::SeqCst);
        self.shared.broker.wake_all();
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        self.shared.stats.record_dispose();
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let sessions: Vec<_> = self.shared.sessions.lock().drain(..).collect();
        for session in sessions {
            if session.shutdown() {
                session.stats().record_dispose();
            }
        }
        let temporaries: Vec<_> = self.shared.temporaries.lock().drain(..).collect();
        for temporary in &temporaries {
            self.shared.broker.delete_temporary(temporary);
        }

        debug!(
            "Closed simulated connection {} ({} temporary destination(s) removed)",
            self.shared.id,
            temporaries.len()
        );
        self.shared.broker.wake_all();
        Ok(())
    }
}
