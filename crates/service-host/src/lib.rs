//! Courier Service Host
//!
//! Binds gateway listeners to request handlers:
//! - `ServiceHost` decodes requests, runs the handler and replies on
//!   `reply_to`, turning handler errors into `Fault` replies
//! - `ServiceRegistry` maps configured service types to handlers
//! - `ServiceManager` starts and disposes a group of hosts
//! - `ServiceHostMonitor` periodically proves each host's connection
//!
//! Hosts are usually built from a [`HostConfig`] document with
//! [`create_service_hosts`].

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod host;
pub mod manager;
pub mod monitor;
pub mod registry;
pub mod serializer;
pub mod service;

pub use bootstrap::create_service_hosts;
pub use config::{HostConfig, ServiceHostConfig};
pub use error::{ConfigError, HostError, Result, ServiceError};
pub use host::{HostStats, ServiceHost};
pub use manager::ServiceManager;
pub use monitor::{ConnectionProbe, MIN_MONITOR_INTERVAL, MonitorConfig, ServiceHostMonitor};
pub use registry::ServiceRegistry;
pub use serializer::JsonSerializer;
pub use service::{RequestHandler, Service, ServiceAdapter};
