//! Building service hosts from configuration

use courier_gateway::{ConnectionManager, GatewayListener};
use courier_ports::{ConnectionFactory, MessageSerializer};
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ServiceHostConfig;
use crate::error::{HostError, Result};
use crate::host::ServiceHost;
use crate::manager::ServiceManager;
use crate::registry::ServiceRegistry;

/// One [`ServiceHost`] per config, sharing a connection per broker host and
/// client id
///
/// Every `serviceType` is resolved before anything is built, so an unknown
/// type leaves nothing behind. Failover settings of the first config naming a
/// broker host apply to its shared connection. Hosts are returned unstarted.
pub fn create_service_hosts(
    configs: &[ServiceHostConfig],
    factory: Arc<dyn ConnectionFactory>,
    registry: &ServiceRegistry,
    serializer: Arc<dyn MessageSerializer>,
) -> Result<ServiceManager> {
    let handlers = configs
        .iter()
        .map(|config| {
            registry
                .resolve(&config.service_type)
                .ok_or_else(|| HostError::UnknownService(config.service_type.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut shared: HashMap<(String, Option<String>), Arc<ConnectionManager>> = HashMap::new();
    let mut connections = Vec::new();
    let mut hosts = Vec::with_capacity(configs.len());

    for (config, handler) in configs.iter().zip(handlers) {
        let key = (config.host(), config.client_id.clone());
        let manager = shared
            .entry(key)
            .or_insert_with(|| {
                let mut manager = ConnectionManager::new(config.host(), Arc::clone(&factory))
                    .with_failover(config.failover_settings.clone().unwrap_or_default());
                if let Some(client_id) = &config.client_id {
                    manager = manager.with_client_id(client_id.clone());
                }
                let manager = Arc::new(manager);
                connections.push(Arc::clone(&manager));
                manager
            })
            .clone();

        let listener = Arc::new(GatewayListener::new(
            config.destination(),
            manager,
            config.listener_options(),
        ));
        hosts.push(Arc::new(ServiceHost::new(
            listener,
            handler,
            Arc::clone(&serializer),
        )));
        info!("Hosting {} on {}", config.service_type, config.uri);
    }

    Ok(ServiceManager::with_connections(hosts, connections))
}
