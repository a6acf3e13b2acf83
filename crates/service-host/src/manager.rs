use courier_gateway::ConnectionManager;
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::host::ServiceHost;
use crate::monitor::{ConnectionProbe, MonitorConfig, ServiceHostMonitor};

/// Owns a set of service hosts and the connections they share
pub struct ServiceManager {
    hosts: Vec<Arc<ServiceHost>>,
    connections: Vec<Arc<ConnectionManager>>,
    monitor: Mutex<Option<ServiceHostMonitor>>,
    disposed: AtomicBool,
}

impl ServiceManager {
    pub fn new(hosts: Vec<Arc<ServiceHost>>) -> Self {
        Self::with_connections(hosts, Vec::new())
    }

    /// Manager that also closes `connections` when disposed
    pub fn with_connections(
        hosts: Vec<Arc<ServiceHost>>,
        connections: Vec<Arc<ConnectionManager>>,
    ) -> Self {
        Self {
            hosts,
            connections,
            monitor: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn hosts(&self) -> &[Arc<ServiceHost>] {
        &self.hosts
    }

    pub fn connections(&self) -> &[Arc<ConnectionManager>] {
        &self.connections
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Start every host's listener, stopping at the first failure
    pub async fn start(&self) -> Result<()> {
        for host in &self.hosts {
            host.start().await?;
        }
        info!("Started {} service hosts", self.hosts.len());
        Ok(())
    }

    /// Supervise every host with a [`ServiceHostMonitor`]; replaces a running one
    pub async fn start_monitor(&self, config: MonitorConfig) {
        let targets = self
            .hosts
            .iter()
            .map(|host| Arc::clone(host) as Arc<dyn ConnectionProbe>)
            .collect();
        let previous = self
            .monitor
            .lock()
            .await
            .replace(ServiceHostMonitor::start(config, targets));
        if let Some(previous) = previous {
            previous.dispose().await;
        }
    }

    /// Completed monitor rounds, zero when no monitor runs
    pub async fn monitor_rounds(&self) -> u64 {
        self.monitor.lock().await.as_ref().map_or(0, ServiceHostMonitor::rounds)
    }

    /// Stop monitoring, dispose every host, then close the connections;
    /// only the first call has an effect
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(monitor) = self.monitor.lock().await.take() {
            monitor.dispose().await;
        }
        for host in &self.hosts {
            host.dispose().await;
        }
        for connection in &self.connections {
            connection.close().await;
        }
        if self.hosts.iter().any(|h| h.listener().last_error().is_some()) {
            warn!("Some service hosts had stopped with errors before disposal");
        }
        info!("Disposed {} service hosts", self.hosts.len());
    }
}
