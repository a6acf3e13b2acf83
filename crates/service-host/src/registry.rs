use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use crate::service::{RequestHandler, Service, ServiceAdapter};

/// Maps service type names to handlers
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed service under `service_type`
    pub fn register<S: Service>(&mut self, service_type: impl Into<String>, service: S) -> &mut Self {
        self.register_handler(service_type, Arc::new(ServiceAdapter::new(service)))
    }

    /// Register an already erased handler; replaces any earlier one
    pub fn register_handler(
        &mut self,
        service_type: impl Into<String>,
        handler: Arc<dyn RequestHandler>,
    ) -> &mut Self {
        let service_type = service_type.into();
        debug!("Registered service type {}", service_type);
        self.handlers.insert(service_type, handler);
        self
    }

    pub fn resolve(&self, service_type: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.get(service_type).cloned()
    }

    pub fn contains(&self, service_type: &str) -> bool {
        self.handlers.contains_key(service_type)
    }

    pub fn service_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
