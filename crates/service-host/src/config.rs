//! Configuration loading for service hosts
//!
//! One JSON document lists the hosted services and the monitor interval:
//!
//! ```json
//! {
//!   "monitorIntervalMs": 30000,
//!   "hosts": [
//!     {
//!       "uri": "tcp://localhost:61616/Orders",
//!       "serviceType": "OrderService",
//!       "deadLetterQueue": "Orders.DLQ",
//!       "maxRedeliveryCount": 3,
//!       "failoverSettings": { "brokerUris": ["tcp://backup:61616"] }
//!     }
//!   ]
//! }
//! ```

use courier_core::{Destination, DestinationKind, DestinationUri, FailoverSettings};
use courier_gateway::ListenerOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::monitor::MonitorConfig;

/// One hosted service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHostConfig {
    /// Full destination URI the service listens on
    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_settings: Option<FailoverSettings>,

    /// Registry key of the request handler
    pub service_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_queue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_redelivery_count: Option<u32>,

    #[serde(default)]
    pub destination_kind: DestinationKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durable_subscriber_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl ServiceHostConfig {
    pub fn new(uri: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            failover_settings: None,
            service_type: service_type.into(),
            dead_letter_queue: None,
            max_redelivery_count: None,
            destination_kind: DestinationKind::Queue,
            durable_subscriber_id: None,
            client_id: None,
        }
    }

    pub fn destination(&self) -> Destination {
        Destination::new(self.destination_kind, self.uri.clone())
    }

    /// Broker endpoint part of `uri`
    pub fn host(&self) -> String {
        DestinationUri::parse(&self.uri).host().to_string()
    }

    pub fn listener_options(&self) -> ListenerOptions {
        let mut options = ListenerOptions::new();
        options.dead_letter_queue = self.dead_letter_queue.clone();
        options.max_redelivery_count = self.max_redelivery_count;
        options.durable_subscriber_id = self.durable_subscriber_id.clone();
        options
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.service_type.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("hosts[{index}]: serviceType is empty")));
        }
        if self.host().is_empty() || DestinationUri::parse(&self.uri).path().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "hosts[{index}]: uri {:?} must name a broker and a destination",
                self.uri
            )));
        }
        if self.durable_subscriber_id.is_some() && self.destination_kind != DestinationKind::Topic {
            return Err(ConfigError::Invalid(format!(
                "hosts[{index}]: durableSubscriberId requires a Topic destination"
            )));
        }
        Ok(())
    }
}

/// Root configuration for a service host process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    #[serde(default)]
    pub hosts: Vec<ServiceHostConfig>,
}

fn default_monitor_interval_ms() -> u64 {
    30_000
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
            hosts: Vec::new(),
        }
    }
}

impl HostConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval_ms == 0 {
            return Err(ConfigError::Invalid("monitorIntervalMs must be positive".into()));
        }
        for (index, host) in self.hosts.iter().enumerate() {
            host.validate(index)?;
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::new().with_interval(self.monitor_interval())
    }
}
